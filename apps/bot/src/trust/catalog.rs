//! Localized strings for the rating flow.
//!
//! Each prompt pairs fixed wording with a fragment telling the user how to
//! answer. The fragment depends on whether ratings are collected through a
//! structured selector (list or flow) or as a typed number; the wording
//! around it never changes.

use std::fmt;

use crate::config::RatingPromptMode;
use crate::models::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPromptKey {
    Intro,
    Invalid,
    CheckIn,
    RatingReceived,
}

impl TrustPromptKey {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustPromptKey::Intro => "intro",
            TrustPromptKey::Invalid => "invalid",
            TrustPromptKey::CheckIn => "check_in",
            TrustPromptKey::RatingReceived => "rating_received",
        }
    }
}

impl fmt::Display for TrustPromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CatalogEntry {
    intro: &'static str,
    check_in: &'static str,
    invalid_lead: &'static str,
    rating_received: &'static str,
    reply_structured: &'static str,
    reply_text: &'static str,
    invalid_structured: &'static str,
    invalid_text: &'static str,
    scale_low: &'static str,
    scale_high: &'static str,
    selector_button: &'static str,
    flow_cta: &'static str,
}

const EN: CatalogEntry = CatalogEntry {
    intro: "Welcome! You are participating in a research study about trust in electronic \
            voting machines.\n\n\
            Before we begin, on a scale of 1 to 10, how much do you trust Brazil's \
            electronic voting system?\n\n\
            (1 = no trust at all, 10 = complete trust)",
    check_in: "Quick check-in: On a scale of 1 to 10, how much do you trust Brazil's \
               electronic voting system right now?\n\n\
               (1 = no trust at all, 10 = complete trust)",
    invalid_lead: "Before we continue, ",
    rating_received: "Thank you for sharing your rating. To get us started, I’d love to hear \
                      your thoughts—what comes to mind when you think about the electronic \
                      voting system in Brazil?",
    reply_structured: "Please select your rating from the list below.",
    reply_text: "Please reply with a number from 1 to 10.",
    invalid_structured: "please use the list below to select your rating.",
    invalid_text: "please reply with a number from 1 to 10.",
    scale_low: "No trust at all",
    scale_high: "Complete trust",
    selector_button: "Choose rating",
    flow_cta: "Rate Now",
};

const PT: CatalogEntry = CatalogEntry {
    intro: "Bem-vindo! Voce esta participando de um estudo sobre confianca nas urnas \
            eletronicas.\n\n\
            Antes de comecarmos, em uma escala de 1 a 10, quanto voce confia no sistema \
            eletronico de votacao do Brasil?\n\n\
            (1 = nenhuma confianca, 10 = confianca total)",
    check_in: "Verificacao rapida: Em uma escala de 1 a 10, quanto voce confia no sistema \
               eletronico de votacao do Brasil agora?\n\n\
               (1 = nenhuma confianca, 10 = confianca total)",
    invalid_lead: "",
    rating_received: "Obrigado por compartilhar. Vamos continuar nossa conversa.",
    reply_structured: "Por favor, selecione sua avaliacao na lista abaixo.",
    reply_text: "Por favor, responda com um numero de 1 a 10.",
    invalid_structured: "Por favor, use a lista abaixo para selecionar sua avaliacao.",
    invalid_text: "Por favor, responda com um numero de 1 a 10.",
    scale_low: "Nenhuma confianca",
    scale_high: "Confianca total",
    selector_button: "Escolher nota",
    flow_cta: "Avaliar agora",
};

fn entry(language: Language) -> &'static CatalogEntry {
    match language {
        Language::En => &EN,
        Language::Pt => &PT,
    }
}

/// Text for `key` in `language`, with the reply instruction matching `mode`.
pub fn trust_prompt(language: Language, key: TrustPromptKey, mode: RatingPromptMode) -> String {
    let e = entry(language);
    let structured = mode.is_structured();
    let reply = if structured { e.reply_structured } else { e.reply_text };

    match key {
        TrustPromptKey::Intro => format!("{}\n\n{reply}", e.intro),
        TrustPromptKey::CheckIn => format!("{}\n\n{reply}", e.check_in),
        TrustPromptKey::Invalid => {
            let fragment = if structured { e.invalid_structured } else { e.invalid_text };
            format!("{}{fragment}", e.invalid_lead)
        }
        TrustPromptKey::RatingReceived => e.rating_received.to_string(),
    }
}

/// Descriptions for the ends of the 1-10 scale.
pub fn scale_labels(language: Language) -> (&'static str, &'static str) {
    let e = entry(language);
    (e.scale_low, e.scale_high)
}

/// Label of the button that opens the rating list.
pub fn selector_button_label(language: Language) -> &'static str {
    entry(language).selector_button
}

/// Call-to-action on the rating flow message.
pub fn flow_cta(language: Language) -> &'static str {
    entry(language).flow_cta
}
