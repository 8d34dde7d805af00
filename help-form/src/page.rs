use crate::{
    controller::Notice,
    session::{Phase, SessionState},
    validation::{QuestionForm, ALLOWED_EXTENSIONS, MAX_ATTACHMENT_BYTES},
};
use serde::Serialize;
use serde_json::Value;
use tinytemplate::{error::Error, format, TinyTemplate};

const PAGE_TEMPLATE_NAME: &str = "help-form-page";
const PAGE_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/page.html"));

/// Values typed into the question form, echoed back when a submission fails.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FormDraft {
    pub name: String,
    pub email: String,
    pub question: String,
}

impl From<&QuestionForm> for FormDraft {
    fn from(form: &QuestionForm) -> Self {
        Self {
            name: form.name.clone(),
            email: form.email.clone(),
            question: form.question.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PageContext {
    pub notices: Vec<Notice>,
    pub show_login: bool,
    pub show_form: bool,
    pub show_submitted: bool,
    pub show_logout: bool,
    pub captcha_text: String,
    pub draft: FormDraft,
    pub footer_date: String,
    pub footer_ip: String,
    pub accepted_extensions: String,
    pub max_attachment_mb: usize,
}

impl PageContext {
    pub fn new(
        session: &SessionState,
        notices: Vec<Notice>,
        draft: Option<FormDraft>,
        footer_date: String,
        footer_ip: String,
    ) -> Self {
        let phase = session.phase();
        Self {
            notices,
            show_login: phase == Phase::Unauthenticated,
            show_form: phase == Phase::Editing,
            show_submitted: phase == Phase::Submitted,
            show_logout: phase != Phase::Unauthenticated,
            captcha_text: session
                .captcha()
                .map(|captcha| captcha.text())
                .unwrap_or_default(),
            draft: draft.unwrap_or_default(),
            footer_date,
            footer_ip,
            accepted_extensions: ALLOWED_EXTENSIONS
                .iter()
                .map(|extension| format!(".{extension}"))
                .collect::<Vec<_>>()
                .join(","),
            max_attachment_mb: MAX_ATTACHMENT_BYTES / (1024 * 1024),
        }
    }
}

pub fn render_page(context: &PageContext) -> Result<String, Error> {
    let mut tt = TinyTemplate::new();
    tt.add_formatter("render_lines", render_lines);
    tt.add_template(PAGE_TEMPLATE_NAME, PAGE_TEMPLATE)?;
    tt.render(PAGE_TEMPLATE_NAME, context)
}

fn render_lines(value: &Value, output: &mut String) -> Result<(), Error> {
    let mut formatted = String::new();
    format(value, &mut formatted)?;
    output.push_str(&formatted.replace('\n', "<br>"));
    Ok(())
}
