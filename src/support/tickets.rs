//! Ticket taxonomy, duplicate detection and lifecycle rules. Pure
//! functions; the handlers in `super` own the store and the transport.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::entries::{Ticket, TicketCategory, TicketMessage, TicketSender, TicketStatus};

/// Categories are checked in this declaration order; the first whose
/// keyword set matches wins, so ambiguous text resolves
/// deterministically (e.g. a payment complaint that also mentions a
/// broken button lands in Payment).
pub const CATEGORY_ORDER: [TicketCategory; 4] = [
    TicketCategory::Payment,
    TicketCategory::Technical,
    TicketCategory::Suggestion,
    TicketCategory::General,
];

fn keywords(category: TicketCategory) -> &'static [&'static str] {
    match category {
        TicketCategory::Payment => &[
            "оплат", "плате", "премиум", "premium", "счет", "счёт", "invoice", "крипт", "донат",
            "деньг", "возврат", "refund",
        ],
        TicketCategory::Technical => &[
            "не работает", "ошибк", "баг", "глюк", "завис", "слома", "краш", "вылета", "bug",
            "error", "проблем",
        ],
        TicketCategory::Suggestion => &[
            "предлож", "предлага", "идея", "добавьте", "хотелось бы", "suggest", "feature",
        ],
        TicketCategory::General => &["вопрос", "подскаж", "помог", "справк", "как "],
        TicketCategory::Other => &[],
    }
}

pub fn categorize(text: &str) -> TicketCategory {
    let text = text.to_lowercase();

    CATEGORY_ORDER
        .into_iter()
        .find(|category| keywords(*category).iter().any(|kw| text.contains(kw)))
        .unwrap_or(TicketCategory::Other)
}

/// Words are significant when they carry at least this many letters.
pub const SIGNIFICANT_WORD_LEN: usize = 4;

/// Tickets sharing at least this many significant words are duplicates.
pub const DUPLICATE_WORD_OVERLAP: usize = 3;

/// Only this many of the user's most recent open tickets are compared.
pub const RECENT_TICKET_WINDOW: usize = 5;

pub fn significant_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= SIGNIFICANT_WORD_LEN)
        .map(str::to_owned)
        .collect()
}

pub fn shared_significant_words(a: &str, b: &str) -> usize {
    let a = significant_words(a);
    let b = significant_words(b);
    a.intersection(&b).count()
}

/// Scans the user's open tickets, newest first, and returns the seqs of
/// those whose opening message shares enough significant words with the
/// new text. Only `new`/`pending` tickets within the recent window
/// qualify.
pub fn find_duplicates<'a>(
    open_tickets: impl IntoIterator<Item = &'a Ticket>,
    text: &str,
) -> Vec<u64> {
    open_tickets
        .into_iter()
        .filter(|t| t.status.is_open())
        .take(RECENT_TICKET_WINDOW)
        .filter(|t| {
            t.first_message()
                .map(|m| shared_significant_words(&m.text, text) >= DUPLICATE_WORD_OVERLAP)
                .unwrap_or(false)
        })
        .map(|t| t.seq)
        .collect()
}

pub fn new_ticket(
    seq: u64,
    user_id: teloxide::types::UserId,
    text: String,
    duplicate_of: Option<u64>,
    now: DateTime<Utc>,
) -> Ticket {
    Ticket {
        seq,
        user_id,
        category: categorize(&text),
        status: TicketStatus::New,
        messages: vec![TicketMessage {
            text,
            sender: TicketSender::User,
            at: now,
        }],
        duplicate_of,
        created: now,
        status_changed: now,
    }
}

/// Status transitions are intentionally permissive (any status can
/// follow any other); every change leaves a system audit message so the
/// history stays reconstructible.
pub fn update_status(ticket: &mut Ticket, status: TicketStatus, actor: &str, now: DateTime<Utc>) {
    let old = ticket.status;
    ticket.status = status;
    ticket.status_changed = now;
    ticket.messages.push(TicketMessage {
        text: format!("статус: {} → {} ({})", old, status, actor),
        sender: TicketSender::System,
        at: now,
    });
}

pub fn append_message(ticket: &mut Ticket, text: String, sender: TicketSender, now: DateTime<Utc>) {
    ticket.messages.push(TicketMessage { text, sender, at: now });
}

/// Accepts `TKT000123` (any case) or a bare sequence number.
pub fn parse_ticket_ref(reference: &str) -> Option<u64> {
    let reference = reference.trim();
    let digits = reference
        .strip_prefix("TKT")
        .or_else(|| reference.strip_prefix("tkt"))
        .unwrap_or(reference);

    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::UserId;

    #[test]
    fn payment_keyword_wins_over_later_categories() {
        // "проблема" also matches Technical, but Payment is checked first
        assert_eq!(
            categorize("у меня проблема с оплатой premium"),
            TicketCategory::Payment
        );
    }

    #[test]
    fn category_fallbacks() {
        assert_eq!(categorize("всё зависло и не работает"), TicketCategory::Technical);
        assert_eq!(
            categorize("предлагаю добавить тёмную тему"),
            TicketCategory::Suggestion
        );
        assert_eq!(categorize("подскажите пожалуйста"), TicketCategory::General);
        assert_eq!(categorize("здравствуйте"), TicketCategory::Other);
    }

    #[test]
    fn significant_words_skip_short_ones_and_count_cyrillic() {
        let words = significant_words("не работает кнопка оплаты телефон");
        assert!(words.contains("кнопка"));
        assert!(words.contains("оплаты"));
        assert!(words.contains("телефон"));
        assert!(words.contains("работает"));
        assert!(!words.contains("не"));
    }

    #[test]
    fn reordered_message_is_still_a_duplicate() {
        let first = new_ticket(
            1,
            UserId(7),
            "не работает кнопка оплаты телефон".to_owned(),
            None,
            Utc::now(),
        );

        let dups = find_duplicates([&first], "кнопка оплаты не работает телефон снова");
        assert_eq!(dups, vec![1]);

        // symmetric: the overlap count does not depend on direction
        assert_eq!(
            shared_significant_words(
                "не работает кнопка оплаты телефон",
                "кнопка оплаты не работает телефон снова"
            ),
            shared_significant_words(
                "кнопка оплаты не работает телефон снова",
                "не работает кнопка оплаты телефон"
            )
        );
    }

    #[test]
    fn two_shared_words_are_not_enough() {
        let first = new_ticket(
            1,
            UserId(7),
            "кнопка оплаты пропала".to_owned(),
            None,
            Utc::now(),
        );

        assert!(find_duplicates([&first], "кнопка оплаты").is_empty());
        assert!(find_duplicates([&first], "другой вопрос целиком").is_empty());
    }

    #[test]
    fn resolved_tickets_never_match() {
        let mut first = new_ticket(
            1,
            UserId(7),
            "не работает кнопка оплаты телефон".to_owned(),
            None,
            Utc::now(),
        );
        update_status(&mut first, TicketStatus::Solved, "admin", Utc::now());

        assert!(find_duplicates([&first], "кнопка оплаты не работает телефон").is_empty());
    }

    #[test]
    fn ticket_refs_parse_both_forms() {
        assert_eq!(parse_ticket_ref("TKT000123"), Some(123));
        assert_eq!(parse_ticket_ref("tkt7"), Some(7));
        assert_eq!(parse_ticket_ref("42"), Some(42));
        assert_eq!(parse_ticket_ref("TKT-42"), None);
        assert_eq!(parse_ticket_ref("ticket"), None);
    }

    #[test]
    fn display_id_is_zero_padded() {
        let ticket = new_ticket(123, UserId(7), "вопрос".to_owned(), None, Utc::now());
        assert_eq!(ticket.display_id(), "TKT000123");
    }

    #[test]
    fn status_change_appends_audit_trail() {
        let mut ticket = new_ticket(1, UserId(7), "вопрос".to_owned(), None, Utc::now());
        update_status(&mut ticket, TicketStatus::Closed, "admin", Utc::now());
        // permissive: closed → answered is allowed, only audited
        update_status(&mut ticket, TicketStatus::Answered, "admin", Utc::now());

        assert_eq!(ticket.status, TicketStatus::Answered);
        let audits: Vec<_> = ticket
            .messages
            .iter()
            .filter(|m| m.sender == TicketSender::System)
            .collect();
        assert_eq!(audits.len(), 2);
        assert!(audits[1].text.contains("closed → answered"));
    }
}
