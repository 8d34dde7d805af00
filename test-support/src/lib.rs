pub mod fake_ipify;
pub mod fake_ntp;
pub mod fake_smtp;

use regex::Regex;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::sync::OnceLock;

pub fn setup_logging() {
    // Only the first call in a test binary installs the logger.
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// Finds the arithmetic challenge in a rendered page and computes its answer.
pub fn solve_captcha(page: &str) -> Option<i64> {
    static CAPTCHA: OnceLock<Regex> = OnceLock::new();
    let captures = CAPTCHA
        .get_or_init(|| Regex::new(r"(\d+) ([+*-]) (\d+) = \?").unwrap())
        .captures(page)?;
    let left: i64 = captures[1].parse().ok()?;
    let right: i64 = captures[3].parse().ok()?;
    match &captures[2] {
        "+" => Some(left + right),
        "-" => Some(left - right),
        "*" => Some(left * right),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::solve_captcha;

    #[test]
    fn solves_each_operator() {
        assert_eq!(solve_captcha("<strong>3 + 4 = ?</strong>"), Some(7));
        assert_eq!(solve_captcha("<strong>12 - 9 = ?</strong>"), Some(3));
        assert_eq!(solve_captcha("<strong>6 * 7 = ?</strong>"), Some(42));
    }

    #[test]
    fn returns_none_without_challenge() {
        assert_eq!(solve_captcha("<p>Acesso ao Formulário</p>"), None);
    }
}
