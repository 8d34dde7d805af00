use googletest::prelude::*;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use std::{
    process::{Child, Command},
    time::Duration,
};
use test_support::{
    fake_ipify::{FakeIpify, FAKE_PUBLIC_IP},
    fake_smtp::{fake_smtp, FakeSmtpServer},
    setup_logging, solve_captcha,
};
use tokio::time::{sleep, timeout};

const FORM_PASSWORD: &str = "mentoria-2024";

/// The built binary, killed when the test ends.
struct RunningServer {
    child: Child,
    base_url: String,
}

impl RunningServer {
    fn start(bind_address: &str) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_help-form"))
            .env("FORM_PASSWORD", FORM_PASSWORD)
            .env("EMAIL_USER", "help-form@example.com")
            .env("EMAIL_PASSWORD", "arbitrary app password")
            .env("RECIPIENT_EMAIL", "mentor@example.com")
            .env("SMTP_URL", FakeSmtpServer::url())
            // Nothing answers here, so the server runs on the local clock.
            .env("NTP_SERVER", "127.0.0.1:9")
            .env("PUBLIC_IP_URL", FakeIpify::url())
            .env("BIND_ADDRESS", bind_address)
            .spawn()
            .expect("help-form binary should start");
        Self {
            child,
            base_url: format!("http://{bind_address}"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn wait_until_ready(&self, client: &Client) -> Result<()> {
        for _ in 0..50 {
            if client.get(self.url("/")).send().await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        fail!("help-form did not start listening on {}", self.base_url)
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn client() -> Client {
    Client::builder().cookie_store(true).build().unwrap()
}

#[googletest::test]
#[tokio::test]
async fn sends_question_with_attachment_to_mentor() -> Result<()> {
    setup_logging();
    FakeIpify::start();
    fake_smtp().start();
    let server = RunningServer::start("127.0.0.1:5286");
    let client = client();
    server.wait_until_ready(&client).await?;

    let page = client
        .post(server.url("/login"))
        .form(&[("password", FORM_PASSWORD)])
        .send()
        .await?
        .text()
        .await?;
    let Some(answer) = solve_captcha(&page) else {
        return fail!("No CAPTCHA on the page after login");
    };
    let form = Form::new()
        .text("name", "Maria Silva")
        .text("email", "maria@example.com")
        .text("question", "Como configuro alarmes no CloudWatch?")
        .text("captcha", answer.to_string())
        .part(
            "attachment",
            Part::bytes(b"%PDF-1.4 arbitrary".to_vec())
                .file_name("alarmes.pdf")
                .mime_str("application/pdf")?,
        );
    let page = client
        .post(server.url("/questions"))
        .multipart(form)
        .send()
        .await?
        .text()
        .await?;

    expect_that!(page, contains_substring("Dúvida enviada!"));
    expect_that!(page, contains_substring("action=\"/again\""));
    expect_that!(
        timeout(Duration::from_secs(10), fake_smtp().last_mail_content()).await,
        ok(ok(all!(
            contains_substring("Nome: Maria Silva"),
            contains_substring("Email: maria@example.com"),
            contains_substring("Como configuro alarmes no CloudWatch?"),
            contains_substring(format!("IP: {FAKE_PUBLIC_IP}")),
            contains_substring("Content-Type: application/pdf"),
            contains_substring("filename=\"alarmes.pdf\"")
        )))
    );

    let page = client
        .post(server.url("/logout"))
        .send()
        .await?
        .text()
        .await?;

    verify_that!(
        page,
        all!(
            contains_substring("name=\"password\""),
            not(contains_substring("name=\"captcha\""))
        )
    )
}

#[googletest::test]
#[tokio::test]
async fn rejects_wrong_password() -> Result<()> {
    FakeIpify::start();
    let server = RunningServer::start("127.0.0.1:5287");
    let client = client();
    server.wait_until_ready(&client).await?;

    let page = client
        .post(server.url("/login"))
        .form(&[("password", "wrong")])
        .send()
        .await?
        .text()
        .await?;

    verify_that!(
        page,
        all!(
            contains_substring("Senha incorreta: tente novamente!"),
            not(contains_substring("name=\"captcha\""))
        )
    )
}
