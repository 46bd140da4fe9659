use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Languages the study runs in. Prompt files and rating-flow strings exist
/// for each of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "PT")]
    Pt,
}

impl Language {
    #[cfg(test)]
    pub const ALL: [Language; 2] = [Language::En, Language::Pt];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Pt => "PT",
        }
    }

    /// Lenient lookup used when rendering stored conversations: any code we
    /// have no strings for resolves to the default language.
    pub fn from_code_or_default(code: &str) -> Language {
        code.parse().unwrap_or_default()
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EN" => Ok(Language::En),
            "PT" => Ok(Language::Pt),
            other => Err(format!("unsupported language code '{other}'")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("pt".parse::<Language>().unwrap(), Language::Pt);
        assert_eq!(" En ".parse::<Language>().unwrap(), Language::En);
    }

    #[test]
    fn test_unknown_code_falls_back_to_english() {
        assert_eq!(Language::from_code_or_default("FR"), Language::En);
        assert!("FR".parse::<Language>().is_err());
    }

    #[test]
    fn test_serde_uses_upper_case_codes() {
        assert_eq!(serde_json::to_string(&Language::Pt).unwrap(), "\"PT\"");
    }
}
