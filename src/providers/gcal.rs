//! Google Calendar implementation of the event store, plus the OAuth flow.
//!
//! Credentials and token refresh are handled entirely in here; the
//! reconciler never sees them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_calendar::types::{EventDateTime, OrderBy, SendUpdates};
use google_calendar::Client;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;

use crate::config::{self, AccountTokens, GcalConfig};
use crate::event::Event;
use crate::store::EventStore;

const REDIRECT_PORT: u16 = 8085;
const REDIRECT_URI: &str = "http://localhost:8085/callback";

const SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar"];

/// Listing cap, matching what we ask of the API
const MAX_RESULTS: usize = 500;

/// Create a Google Calendar client from stored tokens
fn create_client(config: &GcalConfig, tokens: &AccountTokens) -> Client {
    Client::new(
        config.client_id.clone(),
        config.client_secret.clone(),
        REDIRECT_URI.to_string(),
        tokens.access_token.clone(),
        tokens.refresh_token.clone(),
    )
}

/// Create a new client for initial authentication (no tokens yet)
fn create_auth_client(config: &GcalConfig) -> Client {
    Client::new(
        config.client_id.clone(),
        config.client_secret.clone(),
        REDIRECT_URI.to_string(),
        String::new(),
        String::new(),
    )
}

/// Start a local HTTP server to receive the OAuth callback
/// Returns (code, state)
fn wait_for_callback() -> Result<(String, String)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", REDIRECT_PORT))
        .with_context(|| format!("Failed to bind to port {}", REDIRECT_PORT))?;

    println!("Waiting for OAuth callback on port {}...", REDIRECT_PORT);

    let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Request line looks like: GET /callback?code=xxx&state=yyy HTTP/1.1
    let url_part = request_line
        .split_whitespace()
        .nth(1)
        .context("Invalid request")?;

    let url = url::Url::parse(&format!("http://localhost{}", url_part))?;

    let code = url
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .context("No code in callback")?;

    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .context("No state in callback")?;

    let response = "HTTP/1.1 200 OK\r\n\
        Content-Type: text/html\r\n\
        Connection: close\r\n\
        \r\n\
        <html><body>\
        <h1>Authentication successful!</h1>\
        <p>You can close this window and return to the terminal.</p>\
        </body></html>";

    stream.write_all(response.as_bytes())?;
    stream.flush()?;

    Ok((code, state))
}

/// Run the full OAuth authentication flow
pub async fn authenticate(config: &GcalConfig) -> Result<AccountTokens> {
    let mut client = create_auth_client(config);

    let scopes: Vec<String> = SCOPES.iter().map(|s| s.to_string()).collect();
    let auth_url = client.user_consent_url(&scopes);

    println!("\nOpen this URL in your browser to authenticate:\n");
    println!("{}\n", auth_url);

    if open::that(&auth_url).is_err() {
        println!("(Could not open browser automatically, please copy the URL above)");
    }

    let (code, state) = wait_for_callback()?;

    println!("\nReceived authorization code, exchanging for tokens...");

    let access_token = client
        .get_access_token(&code, &state)
        .await
        .context("Failed to exchange code for tokens")?;

    println!("Authentication successful!");

    let expires_at = if access_token.expires_in > 0 {
        Some(Utc::now() + chrono::Duration::seconds(access_token.expires_in))
    } else {
        None
    };

    Ok(AccountTokens {
        access_token: access_token.access_token,
        refresh_token: access_token.refresh_token,
        expires_at,
    })
}

/// Refresh an expired access token
pub async fn refresh_token(config: &GcalConfig, tokens: &AccountTokens) -> Result<AccountTokens> {
    let client = create_client(config, tokens);

    let access_token = client
        .refresh_access_token()
        .await
        .context("Failed to refresh token")?;

    let expires_at = if access_token.expires_in > 0 {
        Some(Utc::now() + chrono::Duration::seconds(access_token.expires_in))
    } else {
        None
    };

    // Google typically doesn't return a new refresh_token on refresh
    let refresh_token = if access_token.refresh_token.is_empty() {
        tokens.refresh_token.clone()
    } else {
        access_token.refresh_token
    };

    Ok(AccountTokens {
        access_token: access_token.access_token,
        refresh_token,
        expires_at,
    })
}

/// Convert a Google API event, dropping cancelled events, events without an
/// id, and date-only (all-day) events.
fn from_google_event(event: google_calendar::types::Event) -> Option<Event> {
    if event.status == "cancelled" || event.id.is_empty() {
        return None;
    }

    let start = event.start.as_ref().and_then(|s| s.date_time)?;
    let end = event.end.as_ref().and_then(|e| e.date_time)?;

    Some(Event {
        id: Some(event.id),
        summary: event.summary,
        start,
        end,
    })
}

/// Convert an unsaved block event for insertion, fixed to UTC
fn to_google_event(event: &Event) -> google_calendar::types::Event {
    google_calendar::types::Event {
        summary: event.summary.clone(),
        start: Some(EventDateTime {
            date: None,
            date_time: Some(event.start),
            time_zone: "UTC".to_string(),
        }),
        end: Some(EventDateTime {
            date: None,
            date_time: Some(event.end),
            time_zone: "UTC".to_string(),
        }),
        ..Default::default()
    }
}

/// Event store backed by the Google Calendar API
pub struct GcalStore {
    client: Client,
}

impl GcalStore {
    pub fn new(config: &GcalConfig, tokens: &AccountTokens) -> Self {
        GcalStore {
            client: create_client(config, tokens),
        }
    }

    /// Build a store from environment tokens when present, otherwise from
    /// stored tokens, refreshing an expired access token first.
    pub async fn load() -> Result<Self> {
        let cfg = config::load_gcal_config()?;

        if let Some(tokens) = config::tokens_from_env() {
            return Ok(Self::new(&cfg, &tokens));
        }

        let mut tokens = config::load_tokens()?
            .context("No stored tokens found. Run `calbuffer auth` first")?;

        let expired = tokens.expires_at.map(|at| Utc::now() >= at).unwrap_or(true);
        if expired && !tokens.refresh_token.is_empty() {
            tokens = refresh_token(&cfg, &tokens).await?;
            config::save_tokens(&tokens)?;
        }

        Ok(Self::new(&cfg, &tokens))
    }
}

#[async_trait]
impl EventStore for GcalStore {
    async fn list(
        &self,
        calendar_id: &str,
        time_min: Option<DateTime<Utc>>,
        time_max: Option<DateTime<Utc>>,
        query: Option<&str>,
    ) -> Result<Vec<Event>> {
        let time_min = time_min.map(|t| t.to_rfc3339()).unwrap_or_default();
        let time_max = time_max.map(|t| t.to_rfc3339()).unwrap_or_default();

        let response = self
            .client
            .events()
            .list_all(
                calendar_id,
                "",                      // i_cal_uid
                0,                       // max_attendees
                OrderBy::default(),      // order_by
                &[],                     // private_extended_property
                query.unwrap_or(""),     // q (free-text search)
                &[],                     // shared_extended_property
                false,                   // show_deleted
                false,                   // show_hidden_invitations
                true,                    // single_events: expand recurring events
                &time_max,               // time_max
                &time_min,               // time_min
                "",                      // time_zone
                "",                      // updated_min
            )
            .await
            .with_context(|| format!("Failed to fetch events from {}", calendar_id))?;

        let mut events: Vec<Event> = response
            .body
            .into_iter()
            .filter_map(from_google_event)
            .collect();

        // startTime ordering isn't available on unbounded queries; sort
        // here so callers always get ascending starts
        events.sort_by_key(|e| e.start);
        events.truncate(MAX_RESULTS);

        Ok(events)
    }

    async fn insert(&self, calendar_id: &str, event: &Event) -> Result<Event> {
        let response = self
            .client
            .events()
            .insert(
                calendar_id,
                0,                 // conference_data_version
                0,                 // max_attendees
                false,             // send_notifications (deprecated)
                SendUpdates::None, // send_updates
                false,             // supports_attachments
                &to_google_event(event),
            )
            .await
            .with_context(|| format!("Failed to insert block {} – {}", event.start, event.end))?;

        from_google_event(response.body).context("Inserted event came back without concrete times")
    }

    async fn delete(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let result = self
            .client
            .events()
            .delete(calendar_id, event_id, false, SendUpdates::None)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                // Already gone: a concurrent or earlier partial run removed
                // it, which is success for our purposes
                let msg = e.to_string();
                if msg.contains("404") || msg.contains("410") || msg.contains("Gone") {
                    Ok(())
                } else {
                    Err(e).with_context(|| format!("Failed to delete event: {}", event_id))
                }
            }
        }
    }

    async fn exists_exact(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        title: &str,
    ) -> Result<bool> {
        // Query just the candidate's own window; the text search narrows the
        // result and the exact comparison below decides
        let candidates = self
            .list(calendar_id, Some(start), Some(end), Some(title))
            .await?;

        Ok(candidates
            .iter()
            .any(|e| e.start == start && e.end == end && e.summary == title))
    }
}
