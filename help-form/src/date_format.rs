use chrono::{DateTime, Datelike, Locale, TimeZone, Timelike};
use std::fmt::{Display, Write};

/// Tried in order; the first one chrono has locale data for wins.
pub const LOCALE_CANDIDATES: [&str; 3] = ["pt_BR.UTF-8", "portuguese_brazil", "Portuguese_Brazil"];

const LOCALE_PATTERN: &str = "%A, %d de %B de %Y, %H:%M";

// Indexed by days from Monday.
const WEEKDAYS: [&str; 7] = [
    "Segunda-feira",
    "Terça-feira",
    "Quarta-feira",
    "Quinta-feira",
    "Sexta-feira",
    "Sábado",
    "Domingo",
];

const MONTHS: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

/// Renders a date in full, e.g. "Segunda-feira, 4 de Março de 2024, 06:05".
pub fn format_brazilian_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format_with_locales(date, &LOCALE_CANDIDATES)
}

pub fn format_with_locales<Tz: TimeZone>(date: &DateTime<Tz>, candidates: &[&str]) -> String
where
    Tz::Offset: Display,
{
    candidates
        .iter()
        .find_map(|identifier| format_localized(date, identifier))
        .unwrap_or_else(|| format_with_table(date))
}

pub fn format_with_table<Tz: TimeZone>(date: &DateTime<Tz>) -> String {
    format!(
        "{}, {} de {} de {}, {:02}:{:02}",
        WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS[date.month0() as usize],
        date.year(),
        date.hour(),
        date.minute()
    )
}

fn format_localized<Tz: TimeZone>(date: &DateTime<Tz>, identifier: &str) -> Option<String>
where
    Tz::Offset: Display,
{
    // "pt_BR.UTF-8" names the encoding too, which chrono does not know about.
    let name = identifier.split('.').next().unwrap_or(identifier);
    let locale = Locale::try_from(name).ok()?;
    let mut output = String::new();
    write!(output, "{}", date.format_localized(LOCALE_PATTERN, locale)).ok()?;
    (!output.is_empty()).then_some(output)
}
