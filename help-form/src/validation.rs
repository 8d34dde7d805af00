use crate::{
    captcha::{CaptchaChallenge, CaptchaCheck},
    mailer::Attachment,
};
use regex::Regex;
use std::{fmt::Display, sync::OnceLock};

pub const MAX_ATTACHMENT_BYTES: usize = 30 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "pdf", "docx", "mp3", "mp4"];

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// A question form as the browser sent it.
#[derive(Debug, Default, Clone)]
pub struct QuestionForm {
    pub name: String,
    pub email: String,
    pub question: String,
    pub attachment: Option<Attachment>,
    pub captcha: String,
}

/// Submission problems in the order they are checked. `Display` gives the message for the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    MissingName,
    MissingEmail,
    InvalidEmail,
    MissingQuestion,
    AttachmentTooLarge,
    AttachmentTypeNotAllowed,
    MissingCaptcha,
    MalformedCaptcha,
    IncorrectCaptcha,
}

impl ValidationError {
    /// Whether this failure consumed the current challenge.
    pub fn rotates_captcha(self) -> bool {
        matches!(
            self,
            ValidationError::MalformedCaptcha | ValidationError::IncorrectCaptcha
        )
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingName => write!(f, "Por favor, informe seu nome."),
            ValidationError::MissingEmail => write!(f, "Por favor, informe seu email."),
            ValidationError::InvalidEmail => write!(f, "Por favor, informe um email válido."),
            ValidationError::MissingQuestion => write!(f, "Por favor, descreva sua dúvida."),
            ValidationError::AttachmentTooLarge => write!(
                f,
                "O arquivo excede o limite de 30 MB. Por favor, escolha um arquivo menor."
            ),
            ValidationError::AttachmentTypeNotAllowed => write!(
                f,
                "Tipo de arquivo não permitido. Envie um arquivo {}.",
                ALLOWED_EXTENSIONS.join(", ")
            ),
            ValidationError::MissingCaptcha => write!(f, "Por favor, resolva o CAPTCHA."),
            ValidationError::MalformedCaptcha => {
                write!(f, "Por favor, digite um número válido para o CAPTCHA.")
            }
            ValidationError::IncorrectCaptcha => {
                write!(f, "CAPTCHA incorreto. Por favor, tente novamente.")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
        .is_match(email)
}

/// Runs every check in order and reports the first failure.
pub fn validate_submission(
    form: &QuestionForm,
    captcha: &CaptchaChallenge,
) -> Result<(), ValidationError> {
    if form.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if form.email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if !is_valid_email(&form.email) {
        return Err(ValidationError::InvalidEmail);
    }
    if form.question.trim().is_empty() {
        return Err(ValidationError::MissingQuestion);
    }
    if let Some(attachment) = &form.attachment {
        if attachment.size() > MAX_ATTACHMENT_BYTES {
            return Err(ValidationError::AttachmentTooLarge);
        }
        if !has_allowed_extension(attachment) {
            return Err(ValidationError::AttachmentTypeNotAllowed);
        }
    }
    match captcha.check(&form.captcha) {
        CaptchaCheck::Empty => Err(ValidationError::MissingCaptcha),
        CaptchaCheck::Malformed => Err(ValidationError::MalformedCaptcha),
        CaptchaCheck::Incorrect => Err(ValidationError::IncorrectCaptcha),
        CaptchaCheck::Correct => Ok(()),
    }
}

fn has_allowed_extension(attachment: &Attachment) -> bool {
    attachment
        .extension()
        .is_some_and(|extension| ALLOWED_EXTENSIONS.contains(&extension.as_str()))
}

#[cfg(test)]
mod tests {
    use super::{
        is_valid_email, validate_submission, QuestionForm, ValidationError, MAX_ATTACHMENT_BYTES,
    };
    use crate::{
        captcha::{CaptchaChallenge, Operator},
        mailer::Attachment,
    };
    use googletest::prelude::*;

    fn challenge() -> CaptchaChallenge {
        CaptchaChallenge::fixed(Operator::Add, 2, 3)
    }

    fn valid_form() -> QuestionForm {
        QuestionForm {
            name: "Maria Silva".into(),
            email: "maria@example.com".into(),
            question: "Como configuro um bucket S3?".into(),
            attachment: None,
            captcha: "5".into(),
        }
    }

    #[googletest::test]
    fn accepts_well_formed_addresses() {
        expect_that!(is_valid_email("a@b.co"), eq(true));
        expect_that!(is_valid_email("a.b+c@sub.domain.org"), eq(true));
    }

    #[googletest::test]
    fn rejects_malformed_addresses() {
        expect_that!(is_valid_email("a@b"), eq(false));
        expect_that!(is_valid_email("not-an-email"), eq(false));
        expect_that!(is_valid_email("a@b.c"), eq(false));
        expect_that!(is_valid_email("maria silva@example.com"), eq(false));
    }

    #[googletest::test]
    fn accepts_valid_form() -> Result<()> {
        verify_that!(validate_submission(&valid_form(), &challenge()), ok(eq(())))
    }

    #[googletest::test]
    fn reports_first_failure_in_order() {
        let cases = [
            (
                QuestionForm {
                    name: "".into(),
                    email: "".into(),
                    ..valid_form()
                },
                ValidationError::MissingName,
            ),
            (
                QuestionForm {
                    email: "".into(),
                    question: "".into(),
                    ..valid_form()
                },
                ValidationError::MissingEmail,
            ),
            (
                QuestionForm {
                    email: "maria@localhost".into(),
                    question: "".into(),
                    ..valid_form()
                },
                ValidationError::InvalidEmail,
            ),
            (
                QuestionForm {
                    question: "".into(),
                    captcha: "".into(),
                    ..valid_form()
                },
                ValidationError::MissingQuestion,
            ),
            (
                QuestionForm {
                    attachment: Some(Attachment::new(
                        "video.mp4",
                        vec![0; MAX_ATTACHMENT_BYTES + 1],
                    )),
                    captcha: "".into(),
                    ..valid_form()
                },
                ValidationError::AttachmentTooLarge,
            ),
            (
                QuestionForm {
                    attachment: Some(Attachment::new("script.exe", vec![0; 16])),
                    captcha: "".into(),
                    ..valid_form()
                },
                ValidationError::AttachmentTypeNotAllowed,
            ),
            (
                QuestionForm {
                    captcha: "".into(),
                    ..valid_form()
                },
                ValidationError::MissingCaptcha,
            ),
            (
                QuestionForm {
                    captcha: "cinco".into(),
                    ..valid_form()
                },
                ValidationError::MalformedCaptcha,
            ),
            (
                QuestionForm {
                    captcha: "6".into(),
                    ..valid_form()
                },
                ValidationError::IncorrectCaptcha,
            ),
        ];

        for (form, expected) in cases {
            expect_that!(validate_submission(&form, &challenge()), err(eq(expected)));
        }
    }

    #[googletest::test]
    fn rejects_attachment_one_byte_over_limit() -> Result<()> {
        let form = QuestionForm {
            attachment: Some(Attachment::new("audio.mp3", vec![0; MAX_ATTACHMENT_BYTES + 1])),
            ..valid_form()
        };

        verify_that!(
            validate_submission(&form, &challenge()),
            err(eq(ValidationError::AttachmentTooLarge))
        )
    }

    #[googletest::test]
    fn accepts_attachment_at_exactly_the_limit() -> Result<()> {
        let form = QuestionForm {
            attachment: Some(Attachment::new("slides.pdf", vec![0; MAX_ATTACHMENT_BYTES])),
            ..valid_form()
        };

        verify_that!(validate_submission(&form, &challenge()), ok(eq(())))
    }

    #[googletest::test]
    fn accepts_extensions_regardless_of_case() -> Result<()> {
        let form = QuestionForm {
            attachment: Some(Attachment::new("Foto.JPG", vec![0xff, 0xd8])),
            ..valid_form()
        };

        verify_that!(validate_submission(&form, &challenge()), ok(eq(())))
    }

    #[googletest::test]
    fn only_answer_failures_rotate_the_captcha() {
        expect_that!(ValidationError::MalformedCaptcha.rotates_captcha(), eq(true));
        expect_that!(ValidationError::IncorrectCaptcha.rotates_captcha(), eq(true));
        expect_that!(ValidationError::MissingCaptcha.rotates_captcha(), eq(false));
        expect_that!(ValidationError::MissingName.rotates_captcha(), eq(false));
    }
}
