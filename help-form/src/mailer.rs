use crate::secrets::{
    EnvironmentError, SecretRepository, EMAIL_PASSWORD, EMAIL_USER, RECIPIENT_EMAIL,
};
use async_once_cell::OnceCell;
use lettre::{
    message::{header::ContentType, Body, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::{Credentials, Mechanism},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use mime_guess::mime::Mime;
use std::fmt::Display;
use tracing::{info, warn};

const BODY_HEADER: &str = "CONFIRA ABAIXO A MENSAGEM";
const SUBJECT_PREFIX: &str = "Mentoria AWS - Nova Dúvida de";

/// A file uploaded alongside a question.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn mime(&self) -> Mime {
        mime_guess::from_path(&self.filename).first_or_octet_stream()
    }

    /// Lower-cased extension of the filename, if it has one.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("size", &self.size())
            .finish()
    }
}

/// How an attachment is packaged, chosen from its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    Text(String),
    Image(String),
    Audio(String),
    Pdf,
    Binary,
}

impl AttachmentKind {
    pub fn classify(mime: &Mime) -> Self {
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("text", subtype) => AttachmentKind::Text(subtype.into()),
            ("image", subtype) => AttachmentKind::Image(subtype.into()),
            ("audio", subtype) => AttachmentKind::Audio(subtype.into()),
            ("application", "pdf") => AttachmentKind::Pdf,
            _ => AttachmentKind::Binary,
        }
    }

    fn content_type(&self) -> Result<ContentType, MailError> {
        let content_type = match self {
            AttachmentKind::Text(subtype) => format!("text/{subtype}; charset=utf-8"),
            AttachmentKind::Image(subtype) => format!("image/{subtype}"),
            AttachmentKind::Audio(subtype) => format!("audio/{subtype}"),
            AttachmentKind::Pdf => "application/pdf".into(),
            AttachmentKind::Binary => "application/octet-stream".into(),
        };
        ContentType::parse(&content_type)
            .map_err(|error| MailError::Build(format!("Invalid content type {content_type}: {error}")))
    }
}

pub fn attachment_part(attachment: Attachment) -> Result<SinglePart, MailError> {
    let kind = AttachmentKind::classify(&attachment.mime());
    let Attachment { filename, content } = attachment;
    let (kind, body) = match kind {
        AttachmentKind::Text(subtype) => match String::from_utf8(content) {
            Ok(text) => (AttachmentKind::Text(subtype), Body::new(text)),
            Err(error) => {
                warn!("Attachment {filename} is not valid UTF-8, sending it as binary");
                (AttachmentKind::Binary, Body::new(error.into_bytes()))
            }
        },
        kind => (kind, Body::new(content)),
    };
    let content_type = kind.content_type()?;
    Ok(lettre::message::Attachment::new(filename).body(body, content_type))
}

/// A validated question on its way to the recipient.
#[derive(Debug, Clone)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub question: String,
    pub attachment: Option<Attachment>,
    pub sent_at: Option<String>,
    pub ip_address: Option<String>,
}

pub fn compose_body(
    name: &str,
    email: &str,
    question: &str,
    sent_at: Option<&str>,
    ip_address: Option<&str>,
) -> String {
    let mut body = format!("{BODY_HEADER}\n\nNome: {name}\nEmail: {email}\n\nDúvida:\n{question}\n");
    if let Some(sent_at) = sent_at {
        body.push_str(&format!("\n---\nEnviado: {sent_at}\n"));
    }
    if let Some(ip_address) = ip_address {
        body.push_str(&format!("IP: {ip_address}\n"));
    }
    body
}

pub fn compose_message(
    sender: &Mailbox,
    recipient: &Mailbox,
    submission: Submission,
) -> Result<Message, MailError> {
    let Submission {
        name,
        email,
        question,
        attachment,
        sent_at,
        ip_address,
    } = submission;
    let mut builder = Message::builder()
        .from(sender.clone())
        .to(recipient.clone())
        .subject(format!("{SUBJECT_PREFIX} {name}"));
    match email.parse::<Address>() {
        Ok(address) => builder = builder.reply_to(Mailbox::new(Some(name.clone()), address)),
        Err(error) => warn!("Not setting Reply-To for {email}: {error}"),
    }

    let body = compose_body(
        &name,
        &email,
        &question,
        sent_at.as_deref(),
        ip_address.as_deref(),
    );
    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body));
    if let Some(attachment) = attachment {
        parts = parts.singlepart(attachment_part(attachment)?);
    }
    builder
        .multipart(parts)
        .map_err(|error| MailError::Build(format!("Error building message: {error}")))
}

struct MailAccount {
    username: String,
    password: String,
    sender: Mailbox,
    recipient: Mailbox,
}

/// Sends each submission over its own SMTP connection.
pub struct SmtpMailer<SecretRepositoryT: SecretRepository> {
    secrets_repository: SecretRepositoryT,
    smtp_url: String,
    account: OnceCell<MailAccount>,
}

impl<SecretRepositoryT: SecretRepository> SmtpMailer<SecretRepositoryT> {
    pub fn new(secrets_repository: SecretRepositoryT, smtp_url: impl Into<String>) -> Self {
        Self {
            secrets_repository,
            smtp_url: smtp_url.into(),
            account: Default::default(),
        }
    }

    pub async fn send(&self, submission: Submission) -> Result<(), MailError> {
        let account = self.account.get_or_try_init(self.load_account()).await?;
        let message = compose_message(&account.sender, &account.recipient, submission)?;
        // Built per send and dropped on return, which closes the connection either way.
        let transport = self.transport(account)?;
        transport.send(message).await.map_err(MailError::Transport)?;
        info!("Question delivered via {}", self.smtp_url);
        Ok(())
    }

    async fn load_account(&self) -> Result<MailAccount, MailError> {
        let username = self.secrets_repository.get_secret(EMAIL_USER).await?;
        let password = self.secrets_repository.get_secret(EMAIL_PASSWORD).await?;
        let recipient = self.secrets_repository.get_secret(RECIPIENT_EMAIL).await?;
        Ok(MailAccount {
            sender: username.parse().map_err(MailError::Address)?,
            recipient: recipient.parse().map_err(MailError::Address)?,
            username,
            password,
        })
    }

    fn transport(
        &self,
        account: &MailAccount,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.smtp_url)
            .map_err(MailError::Transport)?
            .authentication(vec![Mechanism::Plain]);

        // Credentials only ever travel over implicit TLS. A misconfigured plain URL then fails
        // authentication at the server instead of leaking the password.
        if self.smtp_url.starts_with("smtps://") {
            builder = builder.credentials(Credentials::new(
                account.username.clone(),
                account.password.clone(),
            ));
        }

        Ok(builder.build())
    }
}

#[derive(Debug)]
pub enum MailError {
    Configuration(EnvironmentError),
    Address(lettre::address::AddressError),
    Build(String),
    Transport(lettre::transport::smtp::Error),
}

impl From<EnvironmentError> for MailError {
    fn from(error: EnvironmentError) -> Self {
        MailError::Configuration(error)
    }
}

impl Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Configuration(error) => write!(f, "Configuration error: {error}"),
            MailError::Address(error) => write!(f, "Invalid address: {error}"),
            MailError::Build(description) => write!(f, "{description}"),
            MailError::Transport(error) => write!(f, "SMTP error: {error}"),
        }
    }
}

impl std::error::Error for MailError {}
