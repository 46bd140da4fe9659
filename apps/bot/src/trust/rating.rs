use crate::models::MessageKind;

/// Prefix of the reply identifiers we put on list rows and flow answers.
pub const STRUCTURED_REPLY_PREFIX: &str = "rating_";

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

/// Parses a rating from either free text or a structured reply identifier.
pub fn parse_rating(input: &str, kind: MessageKind) -> Option<u8> {
    match kind {
        MessageKind::Text => parse_text_rating(input),
        MessageKind::Interactive => parse_interactive_rating(input),
    }
}

/// Accepts only a bare integer in 1-10 after trimming. "7/10" and "seven" are
/// rejected.
pub fn parse_text_rating(text: &str) -> Option<u8> {
    text.trim().parse::<i64>().ok().and_then(in_range)
}

/// Accepts identifiers of the form `rating_<n>` with n in 1-10.
pub fn parse_interactive_rating(reply_id: &str) -> Option<u8> {
    let value = reply_id.strip_prefix(STRUCTURED_REPLY_PREFIX)?;
    value.parse::<i64>().ok().and_then(in_range)
}

/// Identifier for a structured reply carrying `score`.
pub fn structured_reply_id(score: impl std::fmt::Display) -> String {
    format!("{STRUCTURED_REPLY_PREFIX}{score}")
}

/// True when a check-in rating is due after `user_turn_count` turns.
pub fn should_trigger_check_in(user_turn_count: u32, interval: u32) -> bool {
    interval > 0 && user_turn_count > 0 && user_turn_count % interval == 0
}

fn in_range(value: i64) -> Option<u8> {
    if (i64::from(MIN_SCORE)..=i64::from(MAX_SCORE)).contains(&value) {
        u8::try_from(value).ok()
    } else {
        None
    }
}
