//! The Graph session: settings plus the credential and client built from them.
//!
//! A [`GraphSession`] starts uninitialized. [`GraphSession::initialize`]
//! builds a device-code credential and an HTTP transport from [`Settings`];
//! every other operation fails with [`SessionError::NotInitialized`] until
//! then. Re-initializing swaps the whole state at once, so an operation that
//! is already running keeps using the state it started with.

use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiError, Direction, GraphRequest, GraphTransport, HttpTransport};
use crate::auth::{DeviceCodeCredential, DeviceCodePrompt, TokenCredential};
use crate::config::Settings;
use crate::error::SessionError;
use crate::models::{Collection, CreatedEvent, Message, MessageSummary, NewEvent, SendMailRequest, UserProfile};

/// Number of messages fetched by [`GraphSession::get_inbox_messages`]
pub const INBOX_PAGE_SIZE: u32 = 25;

const PROFILE_FIELDS: &[&str] = &["displayName", "mail", "userPrincipalName"];
const INBOX_FIELDS: &[&str] = &["from", "isRead", "receivedDateTime", "subject"];

struct SessionState {
    settings: Settings,
    credential: Arc<dyn TokenCredential>,
    transport: Arc<dyn GraphTransport>,
}

#[derive(Default)]
pub struct GraphSession {
    state: RwLock<Option<Arc<SessionState>>>,
}

impl GraphSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize for user auth with a device-code credential.
    ///
    /// `prompt` is called with the code and URL the user must visit the first
    /// time a token is needed.
    pub fn initialize(&self, settings: Settings, prompt: DeviceCodePrompt) -> Result<(), SessionError> {
        settings.validate()?;
        let credential = DeviceCodeCredential::new(&settings.client_id, &settings.tenant_id, prompt)?;
        self.initialize_with_credential(settings, Arc::new(credential))
    }

    /// Initialize with a caller-built credential, wrapped in an HTTP transport
    pub fn initialize_with_credential(
        &self,
        settings: Settings,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<(), SessionError> {
        settings.validate()?;
        let transport = HttpTransport::new(Arc::clone(&credential), settings.graph_user_scopes.clone())?;
        self.initialize_with(settings, credential, Arc::new(transport))
    }

    /// Initialize with explicit collaborators
    pub fn initialize_with(
        &self,
        settings: Settings,
        credential: Arc<dyn TokenCredential>,
        transport: Arc<dyn GraphTransport>,
    ) -> Result<(), SessionError> {
        settings.validate()?;
        info!(
            tenant = %settings.tenant_id,
            scopes = settings.graph_user_scopes.len(),
            "Graph session initialized for user auth"
        );
        let state = Arc::new(SessionState {
            settings,
            credential,
            transport,
        });
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Settings the session was last initialized with
    pub fn settings(&self) -> Option<Settings> {
        self.snapshot().ok().map(|state| state.settings.clone())
    }

    fn snapshot(&self) -> Result<Arc<SessionState>, SessionError> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SessionError::NotInitialized)
    }

    /// Snapshot for an operation that needs a token: scopes must be configured
    fn authorized(&self) -> Result<Arc<SessionState>, SessionError> {
        let state = self.snapshot()?;
        if state.settings.graph_user_scopes.is_empty() {
            return Err(SessionError::Config("Setting \"scopes\" cannot be undefined".to_string()));
        }
        Ok(state)
    }

    async fn fetch<T: DeserializeOwned>(state: &SessionState, request: &GraphRequest) -> Result<T, SessionError> {
        let body = state.transport.perform(request).await?.unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", request.path, e)).into()
        })
    }

    /// Bearer token for the configured scopes
    pub async fn get_current_user_token(&self) -> Result<String, SessionError> {
        let state = self.authorized()?;
        let token = state.credential.get_token(&state.settings.graph_user_scopes).await?;
        Ok(token.token)
    }

    pub async fn get_current_user_profile(&self) -> Result<UserProfile, SessionError> {
        let state = self.authorized()?;
        let request = GraphRequest::get("/me").select(PROFILE_FIELDS);
        Self::fetch(&state, &request).await
    }

    /// Most recent inbox messages, newest first
    pub async fn get_inbox_messages(&self) -> Result<Collection<MessageSummary>, SessionError> {
        let state = self.authorized()?;
        let request = GraphRequest::get("/me/mailFolders/inbox/messages")
            .select(INBOX_FIELDS)
            .top(INBOX_PAGE_SIZE)
            .order_by("receivedDateTime", Direction::Descending);

        let mut page: Collection<MessageSummary> = Self::fetch(&state, &request).await?;
        // Newest first; messages without a timestamp sort last
        page.value.sort_by(|a, b| b.received_date_time.cmp(&a.received_date_time));
        page.value.truncate(INBOX_PAGE_SIZE as usize);
        debug!(count = page.value.len(), more = page.has_more(), "Fetched inbox page");
        Ok(page)
    }

    /// Send a plain-text message to a single recipient
    pub async fn send_mail(&self, subject: &str, body: &str, recipient: &str) -> Result<(), SessionError> {
        let state = self.authorized()?;
        let payload = SendMailRequest::from(Message::text(subject, body, recipient));
        let request = GraphRequest::post("me/sendMail", &payload)?;
        state.transport.perform(&request).await?;
        info!("Mail submitted for delivery");
        Ok(())
    }

    /// Create an event in the user's default calendar
    pub async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent, SessionError> {
        let state = self.authorized()?;
        event.validate().map_err(SessionError::Config)?;
        let request = GraphRequest::post("/me/events", event)?;

        let body = state
            .transport
            .perform(&request)
            .await
            .map_err(|e| SessionError::Remote(e.to_string()))?;

        let created = match body {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse created event: {}", e))
            })?,
            None => CreatedEvent::default(),
        };
        info!(transaction_id = %event.transaction_id, "Event created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Method;
    use crate::auth::{AccessToken, AuthError, DeviceCodeInfo};
    use crate::error::ErrorKind;
    use crate::models::{AttendeeType, BodyType, DateTimeTimeZone, ItemBody};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeCredential {
        requests: Mutex<Vec<Vec<String>>>,
    }

    impl FakeCredential {
        fn requested(&self) -> Vec<Vec<String>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenCredential for FakeCredential {
        async fn get_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
            self.requests.lock().unwrap().push(scopes.to_vec());
            Ok(AccessToken::new(
                format!("token-for-{}", scopes.join("+")),
                Utc::now() + Duration::hours(1),
            ))
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        requests: Mutex<Vec<GraphRequest>>,
        responses: Mutex<VecDeque<Result<Option<Value>, ApiError>>>,
    }

    impl FakeTransport {
        fn replying(responses: Vec<Result<Option<Value>, ApiError>>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into()),
            }
        }

        fn captured(&self) -> Vec<GraphRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GraphTransport for FakeTransport {
        async fn perform(&self, request: &GraphRequest) -> Result<Option<Value>, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn settings(scopes: &[&str]) -> Settings {
        Settings::new("c", "t", scopes.iter().map(|s| s.to_string()).collect())
    }

    fn session_with(
        scopes: &[&str],
        responses: Vec<Result<Option<Value>, ApiError>>,
    ) -> (GraphSession, Arc<FakeCredential>, Arc<FakeTransport>) {
        let credential = Arc::new(FakeCredential::default());
        let transport = Arc::new(FakeTransport::replying(responses));
        let session = GraphSession::new();
        session
            .initialize_with(settings(scopes), credential.clone(), transport.clone())
            .unwrap();
        (session, credential, transport)
    }

    fn noop_prompt() -> DeviceCodePrompt {
        Arc::new(|_: &DeviceCodeInfo| {})
    }

    fn lunch() -> NewEvent {
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        NewEvent::new(
            "Let's go for lunch",
            DateTimeTimeZone::new(day.and_hms_opt(12, 0, 0).unwrap(), "Pacific Standard Time"),
            DateTimeTimeZone::new(day.and_hms_opt(14, 0, 0).unwrap(), "Pacific Standard Time"),
        )
        .at("Harry's Bar")
        .with_attendee("samanthab@contoso.com", Some("Samantha Booth"), AttendeeType::Required)
    }

    // -------------------------------------------------------------------------
    // Initialization
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_operations_before_initialize_fail_with_state_error() {
        let session = GraphSession::new();
        assert!(!session.is_initialized());

        assert_eq!(session.get_current_user_token().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(session.get_current_user_profile().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(session.get_inbox_messages().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(
            session.send_mail("Hi", "body", "a@b.com").await.unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(session.create_event(&lunch()).await.unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn test_initialize_builds_device_code_session() {
        let session = GraphSession::new();
        session.initialize(settings(&["Mail.Read"]), noop_prompt()).unwrap();
        assert!(session.is_initialized());
        assert_eq!(session.settings().unwrap().graph_user_scopes, vec!["Mail.Read"]);
    }

    #[test]
    fn test_invalid_settings_leave_state_untouched() {
        let session = GraphSession::new();
        let err = session.initialize(Settings::new("", "t", vec![]), noop_prompt()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!session.is_initialized());

        // An existing session survives a failed re-initialization
        session.initialize(settings(&["Mail.Read"]), noop_prompt()).unwrap();
        assert!(session.initialize(Settings::new("c", " ", vec![]), noop_prompt()).is_err());
        assert_eq!(session.settings().unwrap(), settings(&["Mail.Read"]));
    }

    #[tokio::test]
    async fn test_empty_scopes_fail_token_request_with_config_error() {
        let (session, credential, _) = session_with(&[], vec![]);
        assert!(session.is_initialized());

        let err = session.get_current_user_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(credential.requested().is_empty());
    }

    #[tokio::test]
    async fn test_reinitialize_uses_new_scopes() {
        let (session, old_credential, _) = session_with(&["Mail.Read"], vec![]);
        assert_eq!(session.get_current_user_token().await.unwrap(), "token-for-Mail.Read");

        let new_credential = Arc::new(FakeCredential::default());
        session
            .initialize_with(
                settings(&["Calendars.ReadWrite"]),
                new_credential.clone(),
                Arc::new(FakeTransport::default()),
            )
            .unwrap();

        assert_eq!(session.get_current_user_token().await.unwrap(), "token-for-Calendars.ReadWrite");
        assert_eq!(old_credential.requested(), vec![vec!["Mail.Read".to_string()]]);
        assert_eq!(new_credential.requested(), vec![vec!["Calendars.ReadWrite".to_string()]]);
    }

    #[tokio::test]
    async fn test_empty_scopes_fail_every_operation_before_sending() {
        let (session, credential, transport) = session_with(&[], vec![]);

        assert_eq!(session.get_current_user_profile().await.unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(session.get_inbox_messages().await.unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(
            session.send_mail("Hi", "body", "a@b.com").await.unwrap_err().kind(),
            ErrorKind::Config
        );
        assert_eq!(session.create_event(&lunch()).await.unwrap_err().kind(), ErrorKind::Config);

        assert!(credential.requested().is_empty());
        assert!(transport.captured().is_empty());
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_profile_selects_identity_fields() {
        let (session, _, transport) = session_with(
            &["user.read"],
            vec![Ok(Some(json!({
                "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users(displayName,mail,userPrincipalName)/$entity",
                "displayName": "Megan Bowen",
                "mail": "MeganB@contoso.com",
                "userPrincipalName": "MeganB@contoso.com"
            })))],
        );

        let profile = session.get_current_user_profile().await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Megan Bowen"));

        let requests = transport.captured();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].path, "/me");
        assert_eq!(requests[0].select, vec!["displayName", "mail", "userPrincipalName"]);
    }

    #[tokio::test]
    async fn test_inbox_is_limited_and_newest_first() {
        let messages: Vec<Value> = (0..30)
            .map(|i| {
                json!({
                    "subject": format!("Message {}", i),
                    "isRead": i % 2 == 0,
                    "receivedDateTime": (Utc::now() - Duration::minutes(i)).to_rfc3339(),
                    "from": { "emailAddress": { "address": "someone@contoso.com" } }
                })
            })
            .collect();
        let (session, _, transport) = session_with(
            &["mail.read"],
            vec![Ok(Some(json!({
                "value": messages,
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/mailFolders/inbox/messages?$skip=25"
            })))],
        );

        let page = session.get_inbox_messages().await.unwrap();
        assert!(page.value.len() <= INBOX_PAGE_SIZE as usize);
        assert!(page.has_more());
        for pair in page.value.windows(2) {
            assert!(pair[0].received_date_time >= pair[1].received_date_time);
        }

        let request = &transport.captured()[0];
        assert_eq!(request.path, "/me/mailFolders/inbox/messages");
        assert_eq!(request.select, vec!["from", "isRead", "receivedDateTime", "subject"]);
        assert_eq!(request.top, Some(25));
        assert_eq!(request.order_by, Some(("receivedDateTime".to_string(), Direction::Descending)));
    }

    #[tokio::test]
    async fn test_inbox_reorders_out_of_order_page() {
        let now = Utc::now();
        let (session, _, _) = session_with(
            &["mail.read"],
            vec![Ok(Some(json!({
                "value": [
                    { "subject": "undated" },
                    { "subject": "old", "receivedDateTime": (now - Duration::minutes(60)).to_rfc3339() },
                    { "subject": "new", "receivedDateTime": (now - Duration::minutes(1)).to_rfc3339() }
                ]
            })))],
        );

        let page = session.get_inbox_messages().await.unwrap();
        let subjects: Vec<_> = page.value.iter().map(|m| m.subject.as_deref()).collect();
        assert_eq!(subjects, vec![Some("new"), Some("old"), Some("undated")]);
    }

    #[tokio::test]
    async fn test_empty_inbox() {
        let (session, _, _) = session_with(&["mail.read"], vec![Ok(Some(json!({ "value": [] })))]);
        let page = session.get_inbox_messages().await.unwrap();
        assert!(page.value.is_empty());
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn test_send_mail_builds_single_text_recipient() {
        let (session, _, transport) = session_with(&["mail.send"], vec![Ok(None)]);
        session.send_mail("Hi", "body text", "a@b.com").await.unwrap();

        let requests = transport.captured();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].path, "/me/sendMail");

        let body = requests[0].body.as_ref().unwrap();
        let message: Message = serde_json::from_value(body["message"].clone()).unwrap();
        assert_eq!(message.subject, "Hi");
        assert_eq!(message.body.content_type, BodyType::Text);
        assert_eq!(message.body.content, "body text");
        assert_eq!(message.to_recipients.len(), 1);
        assert_eq!(message.to_recipients[0].email_address.address, "a@b.com");
        assert_eq!(body["message"]["body"]["contentType"], "text");
    }

    #[tokio::test]
    async fn test_send_mail_propagates_remote_error() {
        let (session, _, _) = session_with(
            &["mail.send"],
            vec![Err(ApiError::BadRequest("ErrorInvalidRecipients".into()))],
        );
        let err = session.send_mail("Hi", "body", "not-an-address").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.to_string().contains("ErrorInvalidRecipients"));
    }

    #[tokio::test]
    async fn test_create_event_posts_payload() {
        let (session, _, transport) = session_with(
            &["calendars.readwrite"],
            vec![Ok(Some(json!({ "id": "AAMkAGI1", "webLink": "https://outlook.office365.com/owa/" })))],
        );
        let event = lunch().with_body(ItemBody::html("Does noon work for you?"));

        let created = session.create_event(&event).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("AAMkAGI1"));

        let request = &transport.captured()[0];
        assert_eq!(request.path, "/me/events");
        let body = request.body.as_ref().unwrap();
        assert_eq!(body["transactionId"], json!(event.transaction_id));
        assert_eq!(body["attendees"][0]["type"], "required");
        assert_eq!(body["allowNewTimeProposals"], true);
    }

    #[tokio::test]
    async fn test_create_event_wraps_remote_failure() {
        let (session, _, _) = session_with(
            &["calendars.readwrite"],
            vec![Err(ApiError::NotFound("ErrorItemNotFound: calendar".into()))],
        );
        let err = session.create_event(&lunch()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(
            err.to_string(),
            "Error calling Graph: Resource not found: ErrorItemNotFound: calendar"
        );
    }

    #[tokio::test]
    async fn test_create_event_reports_unreadable_response() {
        let (session, _, _) = session_with(
            &["calendars.readwrite"],
            vec![Ok(Some(json!({ "id": 42 })))],
        );
        let err = session.create_event(&lunch()).await.unwrap_err();
        assert!(matches!(err, SessionError::Api(ApiError::InvalidResponse(_))));
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[tokio::test]
    async fn test_create_event_rejects_invalid_event_before_sending() {
        let (session, _, transport) = session_with(&["calendars.readwrite"], vec![]);
        let mut event = lunch();
        event.subject.clear();

        let err = session.create_event(&event).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(transport.captured().is_empty());
    }
}
