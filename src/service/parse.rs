//! Parsers for text scraped from the booking confirmation page

use crate::errors::{TraError, TraResult};

/// Split `"7車12號"` into carriage `"7"` and seat `"12"`.
pub fn parse_carriage_seat(text: &str) -> TraResult<(String, String)> {
    let parts = text.split_once('車').filter(|_| text.contains('號'));
    let Some((carriage, rest)) = parts else {
        return Err(TraError::Format(format!(
            "unexpected carriage/seat text '{text}'"
        )));
    };
    Ok((carriage.trim().to_string(), rest.replace('號', "").trim().to_string()))
}

/// Train type and number from the `th.train-trips` cell.
///
/// The cell renders as `座位：` / `自強(3000)` / `434車次` on separate lines.
pub fn parse_train_info(text: &str) -> TraResult<(String, String)> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() < 3 {
        return Err(TraError::Format(format!("unexpected train info '{text}'")));
    }
    let train_type = lines[1].to_string();
    let train_number = lines[2].replace("車次", "").trim().to_string();
    Ok((train_type, train_number))
}
