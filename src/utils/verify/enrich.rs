//! Suggestion helpers for the wizard. Everything here only proposes
//! candidate values or keyboard rows; nothing is ever written into the
//! conversation fields without the user's explicit pick.

/// Model keyboards per brand. An unknown brand gets no suggestions and
/// the step falls back to plain free text.
pub fn suggest_models(brand: &str) -> &'static [&'static str] {
    match brand.trim().to_lowercase().as_str() {
        "apple" => &[
            "iPhone 11",
            "iPhone 12",
            "iPhone 13",
            "iPhone 13 Pro",
            "iPhone 14",
            "iPhone 14 Pro",
            "iPhone 15",
            "iPhone 15 Pro",
        ],
        "samsung" => &[
            "Galaxy S21",
            "Galaxy S22",
            "Galaxy S23",
            "Galaxy A54",
            "Galaxy A34",
            "Galaxy Note 20",
        ],
        "xiaomi" => &[
            "Xiaomi 12",
            "Xiaomi 13",
            "Mi 11 Lite",
            "Xiaomi 11T",
        ],
        "redmi" => &[
            "Redmi Note 11",
            "Redmi Note 12",
            "Redmi Note 13",
            "Redmi 12",
        ],
        "poco" => &["POCO X5", "POCO X6", "POCO F5"],
        "honor" => &["Honor 90", "Honor X9a", "Honor Magic5 Lite"],
        "huawei" => &["P50", "P60", "Nova 11"],
        "google pixel" => &["Pixel 6", "Pixel 7", "Pixel 7a", "Pixel 8"],
        _ => &[],
    }
}

/// Preset spec values for recognized models, offered as keyboard
/// defaults on the matching steps.
pub struct PresetSpecs {
    pub memory: Option<&'static str>,
    pub ram: Option<&'static str>,
    pub rom: Option<&'static str>,
    pub processor: Option<&'static str>,
}

pub fn preset_specs(model: &str) -> Option<PresetSpecs> {
    let model = model.trim().to_lowercase();

    let preset = if model.contains("iphone 15 pro") {
        PresetSpecs {
            memory: Some("256 ГБ"),
            ram: None,
            rom: None,
            processor: None,
        }
    } else if model.contains("iphone") {
        PresetSpecs {
            memory: Some("128 ГБ"),
            ram: None,
            rom: None,
            processor: None,
        }
    } else if model.contains("galaxy s2") {
        PresetSpecs {
            memory: None,
            ram: Some("8 ГБ"),
            rom: Some("256 ГБ"),
            processor: Some("Snapdragon"),
        }
    } else if model.contains("redmi note") {
        PresetSpecs {
            memory: None,
            ram: Some("6 ГБ"),
            rom: Some("128 ГБ"),
            processor: Some("MediaTek Helio"),
        }
    } else if model.contains("pixel") {
        PresetSpecs {
            memory: None,
            ram: Some("8 ГБ"),
            rom: Some("128 ГБ"),
            processor: Some("Tensor"),
        }
    } else {
        return None;
    };

    Some(preset)
}

/// Typical secondhand price window in USD for a recognized model tier.
pub fn market_range(model: &str) -> Option<(f64, f64)> {
    let model = model.trim().to_lowercase();

    let range = if model.contains("iphone 15") || model.contains("s23") {
        (500.0, 1200.0)
    } else if model.contains("iphone 14") || model.contains("s22") || model.contains("pixel 8") {
        (350.0, 900.0)
    } else if model.contains("iphone 13") || model.contains("s21") || model.contains("pixel 7") {
        (250.0, 650.0)
    } else if model.contains("iphone 12") || model.contains("iphone 11") {
        (150.0, 450.0)
    } else if model.contains("redmi") || model.contains("poco") || model.contains("galaxy a") {
        (80.0, 300.0)
    } else {
        return None;
    };

    Some(range)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceHint {
    BelowMarket,
    AboveMarket,
}

impl PriceHint {
    pub fn message(&self) -> &'static str {
        match self {
            PriceHint::BelowMarket => {
                "⚠️ Цена ниже типичной для этой модели. Проверьте, нет ли опечатки."
            }
            PriceHint::AboveMarket => {
                "⚠️ Цена выше типичной для этой модели. Покупатели могут пройти мимо."
            }
        }
    }
}

/// Soft market-price check: a hint, never a rejection.
pub fn price_hint(model: &str, price_usd: f64) -> Option<PriceHint> {
    let (low, high) = market_range(model)?;

    if price_usd < low {
        Some(PriceHint::BelowMarket)
    } else if price_usd > high {
        Some(PriceHint::AboveMarket)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_brand_gets_model_keyboard() {
        assert!(!suggest_models("Apple").is_empty());
        assert!(!suggest_models("samsung").is_empty());
        assert!(suggest_models("Nokia 3310").is_empty());
    }

    #[test]
    fn price_hint_flags_outliers_only() {
        assert_eq!(price_hint("iPhone 13", 100.0), Some(PriceHint::BelowMarket));
        assert_eq!(price_hint("iPhone 13", 2000.0), Some(PriceHint::AboveMarket));
        assert_eq!(price_hint("iPhone 13", 400.0), None);
        assert_eq!(price_hint("неизвестный телефон", 1.0), None);
    }

    #[test]
    fn presets_only_suggest() {
        let preset = preset_specs("iPhone 13").unwrap();
        assert_eq!(preset.memory, Some("128 ГБ"));
        assert!(preset_specs("кирпич").is_none());
    }
}
