use std::collections::HashMap;

use crate::entries::{ConversationState, DeviceType, FieldId, FieldValue};
use crate::utils::verify::enrich;

pub const MIN_PHOTOS: usize = 2;
pub const MAX_PHOTOS: usize = 4;

/// Every question the wizard can ask. `Photos` is the only step that
/// collects more than one value; the rest map to exactly one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepId {
    Brand,
    Model,
    Memory,
    Ram,
    Rom,
    Processor,
    Condition,
    Battery,
    BatteryState,
    Color,
    Package,
    PriceUsd,
    PriceKgs,
    Contact,
    Photos,
}

impl StepId {
    pub fn field(&self) -> Option<FieldId> {
        match self {
            StepId::Brand => Some(FieldId::Brand),
            StepId::Model => Some(FieldId::Model),
            StepId::Memory => Some(FieldId::Memory),
            StepId::Ram => Some(FieldId::Ram),
            StepId::Rom => Some(FieldId::Rom),
            StepId::Processor => Some(FieldId::Processor),
            StepId::Condition => Some(FieldId::Condition),
            StepId::Battery => Some(FieldId::Battery),
            StepId::BatteryState => Some(FieldId::BatteryState),
            StepId::Color => Some(FieldId::Color),
            StepId::Package => Some(FieldId::Package),
            StepId::PriceUsd => Some(FieldId::PriceUsd),
            StepId::PriceKgs => Some(FieldId::PriceKgs),
            StepId::Contact => Some(FieldId::Contact),
            StepId::Photos => None,
        }
    }

    /// Stable numeric code for callback payloads.
    pub fn code(&self) -> u8 {
        match self {
            StepId::Brand => 0,
            StepId::Model => 1,
            StepId::Memory => 2,
            StepId::Ram => 3,
            StepId::Rom => 4,
            StepId::Processor => 5,
            StepId::Condition => 6,
            StepId::Battery => 7,
            StepId::BatteryState => 8,
            StepId::Color => 9,
            StepId::Package => 10,
            StepId::PriceUsd => 11,
            StepId::PriceKgs => 12,
            StepId::Contact => 13,
            StepId::Photos => 14,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => StepId::Brand,
            1 => StepId::Model,
            2 => StepId::Memory,
            3 => StepId::Ram,
            4 => StepId::Rom,
            5 => StepId::Processor,
            6 => StepId::Condition,
            7 => StepId::Battery,
            8 => StepId::BatteryState,
            9 => StepId::Color,
            10 => StepId::Package,
            11 => StepId::PriceUsd,
            12 => StepId::PriceKgs,
            13 => StepId::Contact,
            14 => StepId::Photos,
            _ => return None,
        })
    }
}

/// Required fields after the brand, in asking order.
const IPHONE_FIELDS: &[FieldId] = &[
    FieldId::Model,
    FieldId::Memory,
    FieldId::Condition,
    FieldId::Battery,
    FieldId::Color,
    FieldId::Package,
    FieldId::PriceUsd,
    FieldId::PriceKgs,
    FieldId::Contact,
];

const ANDROID_FIELDS: &[FieldId] = &[
    FieldId::Model,
    FieldId::Ram,
    FieldId::Rom,
    FieldId::Processor,
    FieldId::Condition,
    FieldId::BatteryState,
    FieldId::Color,
    FieldId::PriceUsd,
    FieldId::PriceKgs,
    FieldId::Contact,
];

const OTHER_FIELDS: &[FieldId] = &[
    FieldId::Model,
    FieldId::Condition,
    FieldId::Color,
    FieldId::PriceUsd,
    FieldId::PriceKgs,
    FieldId::Contact,
];

pub fn branch_fields(device: DeviceType) -> &'static [FieldId] {
    match device {
        DeviceType::Iphone => IPHONE_FIELDS,
        DeviceType::Android => ANDROID_FIELDS,
        DeviceType::Other => OTHER_FIELDS,
    }
}

fn step_for(field: FieldId) -> StepId {
    match field {
        FieldId::Brand => StepId::Brand,
        FieldId::Model => StepId::Model,
        FieldId::Memory => StepId::Memory,
        FieldId::Ram => StepId::Ram,
        FieldId::Rom => StepId::Rom,
        FieldId::Processor => StepId::Processor,
        FieldId::Condition => StepId::Condition,
        FieldId::Battery => StepId::Battery,
        FieldId::BatteryState => StepId::BatteryState,
        FieldId::Color => StepId::Color,
        FieldId::Package => StepId::Package,
        FieldId::PriceUsd => StepId::PriceUsd,
        FieldId::PriceKgs => StepId::PriceKgs,
        FieldId::Contact => StepId::Contact,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextStep {
    Ask(StepId),
    Done,
}

/// The first unanswered question for this branch, or `Done` once every
/// field is present and at least `MIN_PHOTOS` photos are attached.
/// Total over any `fields` content; never yields a field already set.
pub fn next_step(
    device: Option<DeviceType>,
    fields: &HashMap<FieldId, FieldValue>,
    photo_count: usize,
) -> NextStep {
    let Some(device) = device else {
        return NextStep::Ask(StepId::Brand);
    };

    for field in branch_fields(device) {
        if !fields.contains_key(field) {
            return NextStep::Ask(step_for(*field));
        }
    }

    if photo_count < MIN_PHOTOS {
        NextStep::Ask(StepId::Photos)
    } else {
        NextStep::Done
    }
}

/// The step asked right before `current` in this branch, or `None` at
/// the very first step. Used when the history stack is empty.
pub fn structural_prev(current: StepId, device: Option<DeviceType>) -> Option<StepId> {
    if current == StepId::Brand {
        return None;
    }

    let device = device?;
    let fields = branch_fields(device);

    if current == StepId::Photos {
        return fields.last().map(|f| step_for(*f));
    }

    let pos = fields.iter().position(|f| step_for(*f) == current)?;
    match pos {
        0 => Some(StepId::Brand),
        _ => Some(step_for(fields[pos - 1])),
    }
}

pub const BRANDS: &[&str] = &[
    "Apple", "Samsung", "Xiaomi", "Redmi", "Poco", "Honor", "Huawei", "Realme", "Oppo", "Vivo",
    "OnePlus", "Google Pixel", "Другой",
];

pub const MEMORY_SIZES: &[&str] = &["64 ГБ", "128 ГБ", "256 ГБ", "512 ГБ", "1 ТБ"];

pub const RAM_SIZES: &[&str] = &["3 ГБ", "4 ГБ", "6 ГБ", "8 ГБ", "12 ГБ", "16 ГБ"];

pub const ROM_SIZES: &[&str] = &["32 ГБ", "64 ГБ", "128 ГБ", "256 ГБ", "512 ГБ", "1 ТБ"];

pub const CONDITIONS: &[&str] = &[
    "Новый",
    "Идеальное",
    "Хорошее",
    "Среднее",
    "Требует ремонта",
];

pub const BATTERY_STATES: &[&str] = &[
    "Отличное",
    "Хорошее",
    "Среднее",
    "Слабое",
    "Менялась батарея",
];

pub const COLORS: &[&str] = &[
    "Чёрный",
    "Белый",
    "Синий",
    "Зелёный",
    "Красный",
    "Золотой",
    "Серый",
    "Фиолетовый",
];

pub const PACKAGES: &[&str] = &[
    "Полный комплект",
    "Коробка + кабель",
    "Только телефон",
];

pub const PROCESSORS: &[&str] = &[
    "Snapdragon",
    "Exynos",
    "MediaTek Dimensity",
    "MediaTek Helio",
    "Kirin",
    "Tensor",
];

/// How to ask one question: the prompt text, optional fixed choices,
/// and whether free text is accepted alongside them.
#[derive(Clone, Debug)]
pub struct Prompt {
    pub text: String,
    pub choices: Vec<String>,
    pub free_text: bool,
}

impl Prompt {
    fn choose(text: &str, choices: &[&str]) -> Self {
        Self {
            text: text.to_owned(),
            choices: choices.iter().map(|c| (*c).to_owned()).collect(),
            free_text: false,
        }
    }

    fn mixed(text: &str, choices: Vec<String>) -> Self {
        Self {
            text: text.to_owned(),
            choices,
            free_text: true,
        }
    }

    fn free(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            choices: Vec::new(),
            free_text: true,
        }
    }
}

/// Fixed options with the preset for the recognized model moved to the
/// front, so the likeliest answer is the first button.
fn with_preset_first(options: &[&str], preset: Option<&'static str>) -> Vec<String> {
    let mut choices: Vec<String> = options.iter().map(|c| (*c).to_owned()).collect();

    if let Some(preset) = preset {
        if let Some(pos) = choices.iter().position(|c| c == preset) {
            let preset = choices.remove(pos);
            choices.insert(0, preset);
        }
    }

    choices
}

pub fn render_step(step: StepId, state: &ConversationState) -> Prompt {
    let preset = state
        .fields
        .get(&FieldId::Model)
        .and_then(|v| v.as_text())
        .and_then(enrich::preset_specs);

    match step {
        StepId::Brand => Prompt::choose("Выберите бренд телефона:", BRANDS),
        StepId::Model => {
            let brand = state
                .fields
                .get(&FieldId::Brand)
                .and_then(|v| v.as_text())
                .unwrap_or("");

            Prompt::mixed(
                "Укажите модель (или выберите из списка):",
                enrich::suggest_models(brand)
                    .iter()
                    .map(|m| (*m).to_owned())
                    .collect(),
            )
        }
        StepId::Memory => Prompt {
            text: "Объём памяти:".to_owned(),
            choices: with_preset_first(MEMORY_SIZES, preset.and_then(|p| p.memory)),
            free_text: false,
        },
        StepId::Ram => Prompt {
            text: "Объём оперативной памяти:".to_owned(),
            choices: with_preset_first(RAM_SIZES, preset.and_then(|p| p.ram)),
            free_text: false,
        },
        StepId::Rom => Prompt {
            text: "Объём встроенной памяти:".to_owned(),
            choices: with_preset_first(ROM_SIZES, preset.and_then(|p| p.rom)),
            free_text: false,
        },
        StepId::Processor => Prompt::mixed(
            "Какой процессор? Напишите или выберите семейство:",
            with_preset_first(PROCESSORS, preset.and_then(|p| p.processor)),
        ),
        StepId::Condition => Prompt::choose("Состояние телефона:", CONDITIONS),
        StepId::Battery => Prompt::free("Ёмкость аккумулятора в процентах (от 70 до 100):"),
        StepId::BatteryState => Prompt::choose("Состояние батареи:", BATTERY_STATES),
        StepId::Color => Prompt::mixed(
            "Цвет телефона:",
            COLORS.iter().map(|c| (*c).to_owned()).collect(),
        ),
        StepId::Package => Prompt::choose("Что входит в комплект?", PACKAGES),
        StepId::PriceUsd => Prompt::free("Цена в долларах (USD):"),
        StepId::PriceKgs => Prompt::free("Цена в сомах (KGS):"),
        StepId::Contact => Prompt::free(
            "Контакт для связи: @username или номер телефона в формате +996XXXXXXXXX:",
        ),
        StepId::Photos => Prompt::free(
            "Пришлите от 2 до 4 фотографий телефона. Когда закончите, нажмите «Готово».",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fields_of(pairs: &[(FieldId, &str)]) -> HashMap<FieldId, FieldValue> {
        pairs
            .iter()
            .map(|(f, v)| (*f, FieldValue::Text((*v).to_owned())))
            .collect()
    }

    #[test]
    fn asks_brand_before_anything_else() {
        let fields = HashMap::new();
        assert_eq!(next_step(None, &fields, 0), NextStep::Ask(StepId::Brand));
    }

    #[test]
    fn walks_each_branch_without_repeating_a_field() {
        for device in [DeviceType::Iphone, DeviceType::Android, DeviceType::Other] {
            let mut fields = HashMap::new();
            let mut asked = Vec::new();

            loop {
                match next_step(Some(device), &fields, MIN_PHOTOS) {
                    NextStep::Ask(step) => {
                        let field = step.field().expect("photo step is satisfied");
                        assert!(
                            !asked.contains(&field),
                            "{:?} asked twice on {:?}",
                            field,
                            device
                        );
                        asked.push(field);
                        fields.insert(field, FieldValue::Text("x".to_owned()));
                    }
                    NextStep::Done => break,
                }
            }

            assert_eq!(asked, branch_fields(device).to_vec());
        }
    }

    #[test]
    fn done_requires_minimum_photos() {
        let mut fields = HashMap::new();
        for field in branch_fields(DeviceType::Other) {
            fields.insert(*field, FieldValue::Text("x".to_owned()));
        }

        assert_eq!(
            next_step(Some(DeviceType::Other), &fields, 0),
            NextStep::Ask(StepId::Photos)
        );
        assert_eq!(
            next_step(Some(DeviceType::Other), &fields, 1),
            NextStep::Ask(StepId::Photos)
        );
        assert_eq!(next_step(Some(DeviceType::Other), &fields, 2), NextStep::Done);
    }

    #[test]
    fn iphone_branch_asks_memory_and_package() {
        let fields = fields_of(&[(FieldId::Model, "iPhone 13")]);
        assert_eq!(
            next_step(Some(DeviceType::Iphone), &fields, 0),
            NextStep::Ask(StepId::Memory)
        );

        let all: Vec<_> = branch_fields(DeviceType::Iphone).to_vec();
        assert!(all.contains(&FieldId::Package));
        assert!(!branch_fields(DeviceType::Android).contains(&FieldId::Package));
    }

    #[test]
    fn structural_prev_follows_branch_order() {
        assert_eq!(structural_prev(StepId::Brand, Some(DeviceType::Iphone)), None);
        assert_eq!(
            structural_prev(StepId::Model, Some(DeviceType::Iphone)),
            Some(StepId::Brand)
        );
        assert_eq!(
            structural_prev(StepId::Condition, Some(DeviceType::Iphone)),
            Some(StepId::Memory)
        );
        assert_eq!(
            structural_prev(StepId::Photos, Some(DeviceType::Android)),
            Some(StepId::Contact)
        );
    }

    #[test]
    fn step_codes_round_trip() {
        for code in 0..=14 {
            let step = StepId::from_code(code).unwrap();
            assert_eq!(step.code(), code);
        }
        assert_eq!(StepId::from_code(15), None);
    }

    #[test]
    fn preset_spec_becomes_the_first_button() {
        let mut state = ConversationState::new(Utc::now());
        state
            .fields
            .insert(FieldId::Brand, FieldValue::Text("Samsung".to_owned()));
        state
            .fields
            .insert(FieldId::Model, FieldValue::Text("Galaxy S22".to_owned()));

        let prompt = render_step(StepId::Ram, &state);
        assert_eq!(prompt.choices.first().map(String::as_str), Some("8 ГБ"));
        // nothing is lost, only reordered
        assert_eq!(prompt.choices.len(), RAM_SIZES.len());
    }

    #[test]
    fn render_uses_brand_for_model_suggestions() {
        let mut state = ConversationState::new(Utc::now());
        state
            .fields
            .insert(FieldId::Brand, FieldValue::Text("Apple".to_owned()));

        let prompt = render_step(StepId::Model, &state);
        assert!(prompt.free_text);
        assert!(prompt.choices.iter().any(|c| c.contains("iPhone")));
    }
}
