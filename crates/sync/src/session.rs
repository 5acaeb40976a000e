use fzm_gateway::LoginResponse;
use fzm_protocol::RunState;

/// Per-run session data.
///
/// The visit secret is handed out by the service on every new connection
/// and is never persisted. The user token outlives the run through the
/// preference store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Stored token presented at login; `None` asks for a new one.
    pub user_token: Option<String>,
    pub visit_secret: Option<String>,
    pub referral_code: Option<String>,
    pub run_state: RunState,
    pub launch_id: Option<String>,
    /// Address players connect to while running.
    pub server_address: Option<String>,
}

impl Session {
    pub fn new(user_token: Option<String>) -> Self {
        Self {
            user_token: user_token.filter(|t| !t.is_empty()),
            ..Self::default()
        }
    }

    /// True while an instance exists (starting, running or stopping).
    pub fn running(&self) -> bool {
        self.run_state.is_running()
    }

    pub fn authenticated(&self) -> bool {
        self.visit_secret.is_some() && self.user_token.is_some()
    }

    pub(crate) fn apply_login(&mut self, login: &LoginResponse) {
        self.user_token = Some(login.user_token.clone());
        self.referral_code = Some(login.referral_code.clone()).filter(|c| !c.is_empty());
    }
}
