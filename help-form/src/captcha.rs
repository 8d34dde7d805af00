//! Arithmetic challenge shown before a question can be sent.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
}

impl Operator {
    const ALL: [Operator; 3] = [Operator::Add, Operator::Subtract, Operator::Multiply];

    fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '-',
            Operator::Multiply => '*',
        }
    }
}

/// The text and the expected answer are both computed from the same operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    operator: Operator,
    left: i32,
    right: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaCheck {
    Empty,
    Malformed,
    Incorrect,
    Correct,
}

impl CaptchaChallenge {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let operator = Operator::ALL[rng.random_range(0..Operator::ALL.len())];
        let (left, right) = match operator {
            Operator::Add => (rng.random_range(1..=20), rng.random_range(1..=20)),
            // The minuend is always larger, so the answer stays positive.
            Operator::Subtract => (rng.random_range(10..=30), rng.random_range(1..=9)),
            Operator::Multiply => (rng.random_range(1..=10), rng.random_range(1..=10)),
        };
        tracing::debug!(?operator, left, right, "Generated CAPTCHA challenge");
        Self {
            operator,
            left,
            right,
        }
    }

    pub fn text(&self) -> String {
        format!("{} {} {} = ?", self.left, self.operator.symbol(), self.right)
    }

    pub fn answer(&self) -> i32 {
        match self.operator {
            Operator::Add => self.left + self.right,
            Operator::Subtract => self.left - self.right,
            Operator::Multiply => self.left * self.right,
        }
    }

    pub fn check(&self, response: &str) -> CaptchaCheck {
        let response = response.trim();
        if response.is_empty() {
            return CaptchaCheck::Empty;
        }
        match response.parse::<i32>() {
            Ok(answer) if answer == self.answer() => CaptchaCheck::Correct,
            Ok(_) => CaptchaCheck::Incorrect,
            Err(_) => CaptchaCheck::Malformed,
        }
    }

    #[cfg(test)]
    pub fn fixed(operator: Operator, left: i32, right: i32) -> Self {
        Self {
            operator,
            left,
            right,
        }
    }
}
