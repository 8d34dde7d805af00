use crate::{
    controller::{FormController, Notice},
    mailer::Attachment,
    page::{render_page, FormDraft},
    secrets::SecretRepository,
    session::{Phase, SessionStore, SessionVisit},
    validation::QuestionForm,
};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Leaves headroom above the attachment limit so oversize files reach validation.
pub const MAX_REQUEST_BYTES: usize = 40 * 1024 * 1024;

const STYLESHEET: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/style.css"));

pub struct AppState<SecretRepositoryT: SecretRepository> {
    controller: Arc<FormController<SecretRepositoryT>>,
    sessions: Arc<SessionStore>,
}

impl<SecretRepositoryT: SecretRepository> Clone for AppState<SecretRepositoryT> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<SecretRepositoryT: SecretRepository> AppState<SecretRepositoryT> {
    pub fn new(controller: FormController<SecretRepositoryT>, sessions: SessionStore) -> Self {
        Self {
            controller: Arc::new(controller),
            sessions: Arc::new(sessions),
        }
    }

    fn check_out(&self, headers: &HeaderMap) -> SessionVisit {
        let cookies = headers.get(COOKIE).and_then(|value| value.to_str().ok());
        self.sessions.check_out(cookies)
    }

    async fn respond(
        &self,
        mut visit: SessionVisit,
        notices: Vec<Notice>,
        draft: Option<FormDraft>,
    ) -> Response {
        let context = self.controller.page(&mut visit.state, notices, draft).await;
        self.sessions.check_in(&visit);
        let cookie = [(SET_COOKIE, visit.set_cookie_header())];
        match render_page(&context) {
            Ok(html) => (cookie, Html(html)).into_response(),
            Err(error) => {
                error!("Could not render page: {error}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    cookie,
                    "Erro interno. Por favor, tente novamente.",
                )
                    .into_response()
            }
        }
    }
}

pub fn router<SecretRepositoryT: SecretRepository + 'static>(
    state: AppState<SecretRepositoryT>,
) -> Router {
    Router::new()
        .route("/", get(show_page::<SecretRepositoryT>))
        .route("/login", post(login::<SecretRepositoryT>))
        .route("/logout", post(logout::<SecretRepositoryT>))
        .route("/questions", post(submit_question::<SecretRepositoryT>))
        .route("/again", post(fill_again::<SecretRepositoryT>))
        .route("/style.css", get(stylesheet))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    password: String,
}

async fn show_page<SecretRepositoryT: SecretRepository>(
    State(state): State<AppState<SecretRepositoryT>>,
    headers: HeaderMap,
) -> Response {
    let visit = state.check_out(&headers);
    state.respond(visit, Vec::new(), None).await
}

async fn login<SecretRepositoryT: SecretRepository>(
    State(state): State<AppState<SecretRepositoryT>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let mut visit = state.check_out(&headers);
    let notices = state.controller.login(&mut visit.state, &form.password).await;
    state.respond(visit, notices, None).await
}

async fn logout<SecretRepositoryT: SecretRepository>(
    State(state): State<AppState<SecretRepositoryT>>,
    headers: HeaderMap,
) -> Response {
    let mut visit = state.check_out(&headers);
    state.controller.logout(&mut visit.state);
    state.respond(visit, Vec::new(), None).await
}

async fn fill_again<SecretRepositoryT: SecretRepository>(
    State(state): State<AppState<SecretRepositoryT>>,
    headers: HeaderMap,
) -> Response {
    let mut visit = state.check_out(&headers);
    state.controller.fill_again(&mut visit.state);
    state.respond(visit, Vec::new(), None).await
}

async fn submit_question<SecretRepositoryT: SecretRepository>(
    State(state): State<AppState<SecretRepositoryT>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let mut visit = state.check_out(&headers);
    let form = match read_question_form(multipart).await {
        Ok(form) => form,
        Err(error) => {
            warn!("Rejected unreadable question form: {error}");
            let notices = vec![Notice::error(format!(
                "Não foi possível ler o formulário: {error}"
            ))];
            return state.respond(visit, notices, None).await;
        }
    };
    let draft = FormDraft::from(&form);
    let notices = state.controller.submit(&mut visit.state, form).await;
    let draft = (visit.state.phase() == Phase::Editing).then_some(draft);
    state.respond(visit, notices, draft).await
}

async fn stylesheet() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/css; charset=utf-8")], STYLESHEET)
}

async fn read_question_form(mut multipart: Multipart) -> Result<QuestionForm, MultipartError> {
    let mut form = QuestionForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => form.name = field.text().await?,
            "email" => form.email = field.text().await?,
            "question" => form.question = field.text().await?,
            "captcha" => form.captcha = field.text().await?,
            "attachment" => {
                // Browsers send an empty part with no filename when nothing was chosen.
                let filename = field.file_name().unwrap_or_default().to_string();
                let content = field.bytes().await?;
                if !filename.is_empty() {
                    form.attachment = Some(Attachment::new(filename, content.to_vec()));
                }
            }
            _ => {}
        }
    }
    Ok(form)
}
