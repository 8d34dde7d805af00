use crate::captcha::CaptchaChallenge;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

pub const SESSION_COOKIE: &str = "help_form_session";

const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(12 * 60 * 60);
const MAX_SESSIONS: usize = 10_000;

/// An unauthenticated session cannot hold a challenge or a submitted flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Unauthenticated,
    Authenticated {
        captcha: CaptchaChallenge,
        submitted: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Editing,
    Submitted,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    access: Access,
    /// Resolved once per session.
    pub public_ip: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            access: Access::Unauthenticated,
            public_ip: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.access {
            Access::Unauthenticated => Phase::Unauthenticated,
            Access::Authenticated {
                submitted: false, ..
            } => Phase::Editing,
            Access::Authenticated {
                submitted: true, ..
            } => Phase::Submitted,
        }
    }

    pub fn captcha(&self) -> Option<&CaptchaChallenge> {
        match &self.access {
            Access::Authenticated { captcha, .. } => Some(captcha),
            Access::Unauthenticated => None,
        }
    }

    pub fn authenticate(&mut self) {
        if self.access == Access::Unauthenticated {
            self.access = Access::Authenticated {
                captcha: CaptchaChallenge::generate(),
                submitted: false,
            };
        }
    }

    pub fn logout(&mut self) {
        self.access = Access::Unauthenticated;
    }

    pub fn rotate_captcha(&mut self) {
        if let Access::Authenticated { captcha, .. } = &mut self.access {
            *captcha = CaptchaChallenge::generate();
        }
    }

    pub fn mark_submitted(&mut self) {
        if let Access::Authenticated { submitted, .. } = &mut self.access {
            *submitted = true;
        }
    }

    pub fn fill_again(&mut self) {
        if let Access::Authenticated { submitted, .. } = &mut self.access {
            *submitted = false;
        }
    }
}

/// A session taken out of the store for the duration of one request.
pub struct SessionVisit {
    pub id: String,
    pub state: SessionState,
}

impl SessionVisit {
    pub fn set_cookie_header(&self) -> String {
        format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id)
    }
}

struct StoredSession {
    state: SessionState,
    last_seen: Instant,
}

/// In-memory sessions keyed by cookie. The lock is only held while copying state in or out.
/// Concurrent requests on one session each check in their own copy, and the last write wins.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
    idle_limit: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_limits(SESSION_IDLE_LIMIT, MAX_SESSIONS)
    }

    pub fn with_limits(idle_limit: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_limit,
            max_sessions,
        }
    }

    pub fn check_out(&self, cookie_header: Option<&str>) -> SessionVisit {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = cookie_header.and_then(session_id_from_cookies) {
            if let Some(stored) = sessions
                .get(id)
                .filter(|stored| stored.last_seen.elapsed() <= self.idle_limit)
            {
                return SessionVisit {
                    id: id.into(),
                    state: stored.state.clone(),
                };
            }
        }
        let id = generate_session_id();
        debug!("Starting new session");
        SessionVisit {
            id,
            state: SessionState::new(),
        }
    }

    pub fn check_in(&self, visit: &SessionVisit) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if !sessions.contains_key(&visit.id) {
            let idle_limit = self.idle_limit;
            sessions.retain(|_, stored| stored.last_seen.elapsed() <= idle_limit);
            if sessions.len() >= self.max_sessions {
                evict_least_recent(&mut sessions);
            }
        }
        sessions.insert(
            visit.id.clone(),
            StoredSession {
                state: visit.state.clone(),
                last_seen: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn evict_least_recent(sessions: &mut HashMap<String, StoredSession>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, stored)| stored.last_seen)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        warn!("Session store full, evicting least recently used session");
        sessions.remove(&id);
    }
}

fn session_id_from_cookies(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|id| !id.is_empty())
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
