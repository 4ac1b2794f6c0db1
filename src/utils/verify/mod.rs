pub mod enrich;

use std::fmt::{self, Display};

use lazy_static::lazy_static;
use regex::Regex;

use crate::entries::{DeviceType, FieldId, FieldValue, PublishedListing};
use crate::wizard::steps::BATTERY_STATES;

/// A rejected input, with enough context to explain the rule violated
/// in the same turn. The conversation state is never touched on Err.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationError {
    TooShort { min: usize },
    TooLong { max: usize },
    NotANumber,
    NotPositive,
    TooSmall { min: f64 },
    TooLarge { max: f64 },
    BatteryOutOfRange { min: u32, max: u32 },
    BadContact,
    /// Profanity detected; the censored variant is offered to the user,
    /// never substituted silently.
    Profanity { censored: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::TooShort { min } => {
                write!(f, "Слишком коротко, нужно хотя бы {} символа.", min)
            }
            ValidationError::TooLong { max } => {
                write!(f, "Слишком длинно, максимум {} символов.", max)
            }
            ValidationError::NotANumber => write!(f, "Введите число."),
            ValidationError::NotPositive => write!(f, "Число должно быть больше 0."),
            ValidationError::TooSmall { min } => write!(f, "Минимальное значение: {}.", min),
            ValidationError::TooLarge { max } => write!(f, "Максимальное значение: {}.", max),
            ValidationError::BatteryOutOfRange { min, max } => {
                write!(f, "Укажите процент от {} до {}.", min, max)
            }
            ValidationError::BadContact => write!(
                f,
                "Укажите @username или номер телефона, например +996700123456."
            ),
            ValidationError::Profanity { .. } => {
                write!(f, "Текст содержит недопустимые слова.")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub struct PriceBounds {
    pub min: f64,
    pub max: f64,
}

/// Listing prices: anything positive up to a sanity ceiling.
pub const LISTING_PRICE: PriceBounds = PriceBounds {
    min: 0.0,
    max: 1_000_000.0,
};

/// Donations are accepted from 1 USD.
pub const DONATION_PRICE: PriceBounds = PriceBounds {
    min: 1.0,
    max: 10_000.0,
};

/// Premium purchases start at 10 USD.
pub const PREMIUM_PRICE: PriceBounds = PriceBounds {
    min: 10.0,
    max: 10_000.0,
};

pub fn price(raw: &str, bounds: &PriceBounds) -> Result<f64, ValidationError> {
    let value: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| ValidationError::NotANumber)?;

    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NotPositive);
    }
    if value < bounds.min {
        return Err(ValidationError::TooSmall { min: bounds.min });
    }
    if value > bounds.max {
        return Err(ValidationError::TooLarge { max: bounds.max });
    }

    Ok(value)
}

const MODEL_MIN: usize = 2;
const MODEL_MAX: usize = 100;

pub fn model_text(raw: &str) -> Result<String, ValidationError> {
    let text = raw.trim();
    let len = text.chars().count();

    if len < MODEL_MIN {
        return Err(ValidationError::TooShort { min: MODEL_MIN });
    }
    if len > MODEL_MAX {
        return Err(ValidationError::TooLong { max: MODEL_MAX });
    }

    match censor(text) {
        Some(censored) => Err(ValidationError::Profanity { censored }),
        None => Ok(text.to_owned()),
    }
}

pub fn short_text(raw: &str) -> Result<String, ValidationError> {
    let text = raw.trim();
    let len = text.chars().count();

    if len < 1 {
        return Err(ValidationError::TooShort { min: 1 });
    }
    if len > MODEL_MAX {
        return Err(ValidationError::TooLong { max: MODEL_MAX });
    }

    Ok(text.to_owned())
}

const IPHONE_BATTERY_MIN: u32 = 70;
const BATTERY_MAX: u32 = 100;

pub fn battery_iphone(raw: &str) -> Result<u32, ValidationError> {
    let value: u32 = raw
        .trim()
        .trim_end_matches('%')
        .parse()
        .map_err(|_| ValidationError::NotANumber)?;

    if !(IPHONE_BATTERY_MIN..=BATTERY_MAX).contains(&value) {
        return Err(ValidationError::BatteryOutOfRange {
            min: IPHONE_BATTERY_MIN,
            max: BATTERY_MAX,
        });
    }

    Ok(value)
}

/// Generic battery field: a percentage, or one of the qualitative labels.
pub fn battery_general(raw: &str) -> Result<FieldValue, ValidationError> {
    let text = raw.trim();

    if let Ok(value) = text.trim_end_matches('%').parse::<u32>() {
        if value > BATTERY_MAX {
            return Err(ValidationError::BatteryOutOfRange {
                min: 0,
                max: BATTERY_MAX,
            });
        }
        return Ok(FieldValue::Number(value as f64));
    }

    if BATTERY_STATES.iter().any(|s| s.eq_ignore_ascii_case(text) || *s == text) {
        return Ok(FieldValue::Text(text.to_owned()));
    }

    Err(ValidationError::NotANumber)
}

lazy_static! {
    static ref HANDLE_RE: Regex = Regex::new(r"^@[A-Za-z0-9_]{5,32}$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{9,15}$").unwrap();
}

pub fn contact(raw: &str) -> Result<String, ValidationError> {
    let text = raw.trim();

    if HANDLE_RE.is_match(text) || PHONE_RE.is_match(&text.replace([' ', '-'], "")) {
        Ok(text.to_owned())
    } else {
        Err(ValidationError::BadContact)
    }
}

const PROFANITY_STEMS: &[&str] = &[
    "бля", "сука", "суки", "хуй", "хуе", "пизд", "ебан", "ебат", "еблан", "мудак", "мудил",
    "гандон", "долбоёб", "долбоеб", "fuck", "shit", "bitch", "asshole",
];

/// Returns the censored variant if the text contains profanity,
/// `None` when it is clean.
pub fn censor(text: &str) -> Option<String> {
    let mut hit = false;

    let censored = text
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            if PROFANITY_STEMS.iter().any(|stem| lower.contains(stem)) {
                hit = true;
                "*".repeat(word.chars().count())
            } else {
                word.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    hit.then_some(censored)
}

/// Similarity above this is reported as a likely duplicate ad.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;

/// How many of the user's latest listings are compared against.
pub const RECENT_LISTINGS: usize = 5;

/// Finds the most similar of the user's recent listings, if any crosses
/// the duplicate threshold. The warning is advisory; publishing stays
/// possible through an explicit confirmation.
pub fn find_similar_listing<'a>(
    text: &str,
    recent: impl IntoIterator<Item = &'a PublishedListing>,
) -> Option<(&'a PublishedListing, f64)> {
    recent
        .into_iter()
        .take(RECENT_LISTINGS)
        .map(|listing| {
            let score = strsim::normalized_levenshtein(text, &listing.text);
            (listing, score)
        })
        .filter(|(_, score)| *score >= DUPLICATE_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}

/// Field-level dispatch used by the wizard engine.
pub fn validate_field(
    field: FieldId,
    raw: &str,
    device: Option<DeviceType>,
) -> Result<FieldValue, ValidationError> {
    match field {
        FieldId::Model => model_text(raw).map(FieldValue::Text),
        FieldId::PriceUsd | FieldId::PriceKgs => {
            price(raw, &LISTING_PRICE).map(FieldValue::Number)
        }
        FieldId::Battery => match device {
            Some(DeviceType::Iphone) => battery_iphone(raw).map(|v| FieldValue::Number(v as f64)),
            _ => battery_general(raw),
        },
        FieldId::Contact => contact(raw).map(FieldValue::Text),
        _ => short_text(raw).map(FieldValue::Text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use teloxide::types::UserId;

    #[test]
    fn negative_price_is_rejected_as_not_positive() {
        let err = price("-5", &LISTING_PRICE).unwrap_err();
        assert_eq!(err, ValidationError::NotPositive);
        assert!(err.to_string().contains("больше 0"));
    }

    #[test]
    fn price_rejects_text() {
        assert_eq!(
            price("дорого", &LISTING_PRICE).unwrap_err(),
            ValidationError::NotANumber
        );
    }

    #[test]
    fn price_respects_bounds() {
        assert!(price("500", &LISTING_PRICE).is_ok());
        assert!(matches!(
            price("5", &PREMIUM_PRICE).unwrap_err(),
            ValidationError::TooSmall { .. }
        ));
        assert!(matches!(
            price("20000", &DONATION_PRICE).unwrap_err(),
            ValidationError::TooLarge { .. }
        ));
        assert_eq!(price("100,50", &LISTING_PRICE).unwrap(), 100.5);
    }

    #[test]
    fn iphone_battery_window() {
        assert_eq!(battery_iphone("85").unwrap(), 85);
        assert_eq!(battery_iphone("100%").unwrap(), 100);
        assert!(battery_iphone("69").is_err());
        assert!(battery_iphone("101").is_err());
    }

    #[test]
    fn general_battery_accepts_labels() {
        assert_eq!(battery_general("42").unwrap(), FieldValue::Number(42.0));
        assert_eq!(
            battery_general("Хорошее").unwrap(),
            FieldValue::Text("Хорошее".to_owned())
        );
        assert!(battery_general("120").is_err());
        assert!(battery_general("неизвестно").is_err());
    }

    #[test]
    fn contact_accepts_handle_and_phone() {
        assert!(contact("@pavel_durov").is_ok());
        assert!(contact("+996700123456").is_ok());
        assert!(contact("0700 123 456").is_ok());
        assert!(contact("напишите мне").is_err());
        assert!(contact("@ab").is_err());
    }

    #[test]
    fn model_length_window() {
        assert!(model_text("i").is_err());
        assert!(model_text("iPhone 13 Pro").is_ok());
        assert!(model_text(&"x".repeat(101)).is_err());
    }

    #[test]
    fn profanity_is_offered_censored_not_substituted() {
        let err = model_text("iPhone сука 13").unwrap_err();
        match err {
            ValidationError::Profanity { censored } => {
                assert_eq!(censored, "iPhone **** 13");
            }
            other => panic!("expected profanity, got {:?}", other),
        }
    }

    fn listing(text: &str) -> PublishedListing {
        PublishedListing {
            user_id: UserId(1),
            device_type: DeviceType::Iphone,
            text: text.to_owned(),
            price_usd: 100.0,
            price_kgs: 8700.0,
            contact: "@seller".to_owned(),
            photos: vec![],
            published_at: Utc::now(),
        }
    }

    #[test]
    fn near_identical_listing_is_flagged() {
        let old = [listing("iPhone 13, 128 ГБ, хорошее состояние, 450 USD")];
        let hit = find_similar_listing("iPhone 13, 128 ГБ, хорошее состояние, 460 USD", &old);
        assert!(hit.is_some());

        let miss = find_similar_listing("Samsung Galaxy S22, 256 ГБ, новый", &old);
        assert!(miss.is_none());
    }
}
