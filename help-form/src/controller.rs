use crate::{
    clock::{NtpClock, NtpError},
    config::Settings,
    date_format::format_brazilian_date,
    mailer::{SmtpMailer, Submission},
    page::{FormDraft, PageContext},
    public_ip::PublicIpResolver,
    secrets::{SecretRepository, FORM_PASSWORD},
    session::{Phase, SessionState},
    validation::{validate_submission, QuestionForm},
};
use serde::Serialize;
use tracing::{error, info, warn};

const WRONG_PASSWORD: &str = "Senha incorreta: tente novamente!";
const QUESTION_SENT: &str = "✅ Dúvida enviada! Por favor aguarde.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A message shown above the form after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

fn clock_fallback_warning(error: &NtpError) -> Notice {
    Notice::warning(format!(
        "Não foi possível sincronizar com o servidor NTP. Usando horário local. Erro: {error}"
    ))
}

/// Drives a session through login, submission and logout.
pub struct FormController<SecretRepositoryT: SecretRepository> {
    secrets_repository: SecretRepositoryT,
    mailer: SmtpMailer<SecretRepositoryT>,
    clock: NtpClock,
    ip_resolver: PublicIpResolver,
}

impl<SecretRepositoryT: SecretRepository + Clone> FormController<SecretRepositoryT> {
    pub fn new(secrets_repository: SecretRepositoryT, settings: &Settings) -> Self {
        Self {
            mailer: SmtpMailer::new(secrets_repository.clone(), settings.smtp_url.as_str()),
            secrets_repository,
            clock: NtpClock::new(settings.ntp_server.as_str(), settings.network_timeout),
            ip_resolver: PublicIpResolver::new(
                settings.public_ip_url.as_str(),
                settings.network_timeout,
            ),
        }
    }
}

impl<SecretRepositoryT: SecretRepository> FormController<SecretRepositoryT> {
    pub async fn login(&self, session: &mut SessionState, password: &str) -> Vec<Notice> {
        if session.phase() != Phase::Unauthenticated {
            return Vec::new();
        }
        match self.secrets_repository.get_secret(FORM_PASSWORD).await {
            Ok(expected) if expected == password => {
                session.authenticate();
                info!("Visitor authenticated");
                Vec::new()
            }
            Ok(_) => {
                warn!("Rejected login with wrong form password");
                vec![Notice::error(WRONG_PASSWORD)]
            }
            Err(error) => {
                error!("Cannot check form password: {error}");
                vec![Notice::error(WRONG_PASSWORD)]
            }
        }
    }

    pub fn logout(&self, session: &mut SessionState) {
        session.logout();
        info!("Visitor logged out");
    }

    pub fn fill_again(&self, session: &mut SessionState) {
        if session.phase() == Phase::Submitted {
            session.fill_again();
        }
    }

    pub async fn submit(&self, session: &mut SessionState, form: QuestionForm) -> Vec<Notice> {
        if session.phase() != Phase::Editing {
            return Vec::new();
        }
        let Some(captcha) = session.captcha() else {
            return Vec::new();
        };
        if let Err(error) = validate_submission(&form, captcha) {
            if error.rotates_captcha() {
                session.rotate_captcha();
            }
            return vec![Notice::error(error.to_string())];
        }

        let mut notices = Vec::new();
        let reading = self.clock.now().await;
        if let Some(error) = &reading.fallback {
            notices.push(clock_fallback_warning(error));
        }
        let ip_address = self.public_ip(session).await;
        let QuestionForm {
            name,
            email,
            question,
            attachment,
            ..
        } = form;
        let result = self
            .mailer
            .send(Submission {
                name,
                email,
                question,
                attachment,
                sent_at: Some(format_brazilian_date(&reading.time)),
                ip_address: Some(ip_address),
            })
            .await;

        // The answer has been used up whether or not the mail went out.
        session.rotate_captcha();
        match result {
            Ok(()) => {
                session.mark_submitted();
                notices.push(Notice::success(QUESTION_SENT));
            }
            Err(error) => {
                error!("Could not send question: {error}");
                notices.push(Notice::error(format!("Erro ao enviar email: {error}")));
            }
        }
        notices
    }

    /// Gathers what the page needs: footer time, cached IP and the session's current view.
    pub async fn page(
        &self,
        session: &mut SessionState,
        mut notices: Vec<Notice>,
        draft: Option<FormDraft>,
    ) -> PageContext {
        let reading = self.clock.now().await;
        if let Some(error) = &reading.fallback {
            let warning = clock_fallback_warning(error);
            if !notices.contains(&warning) {
                notices.push(warning);
            }
        }
        let ip_address = self.public_ip(session).await;
        PageContext::new(
            session,
            notices,
            draft,
            format_brazilian_date(&reading.time),
            ip_address,
        )
    }

    async fn public_ip(&self, session: &mut SessionState) -> String {
        if let Some(ip_address) = &session.public_ip {
            return ip_address.clone();
        }
        let ip_address = self.ip_resolver.resolve().await;
        session.public_ip = Some(ip_address.clone());
        ip_address
    }
}
