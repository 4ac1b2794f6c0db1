use std::collections::HashMap;
use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, UserId};

use crate::wizard::steps::StepId;

pub mod prelude {
    pub use super::{
        CachedMessage, ConversationState, DeviceType, FieldId, FieldValue, Invoice, InvoicePurpose,
        InvoiceStatus, Profile, PublishedListing, Ticket, TicketCategory, TicketMessage,
        TicketSender, TicketStatus,
    };
}

/// Which branch of the step graph a listing follows. Fixed the moment
/// a brand is chosen; cleared together with the brand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    Iphone,
    Android,
    Other,
}

impl DeviceType {
    pub fn from_brand(brand: &str) -> Self {
        const ANDROID_BRANDS: &[&str] = &[
            "samsung", "xiaomi", "redmi", "poco", "honor", "huawei", "realme", "oppo", "vivo",
            "oneplus", "google pixel", "tecno", "infinix",
        ];

        let brand = brand.trim().to_lowercase();
        if brand == "apple" || brand.starts_with("iphone") {
            DeviceType::Iphone
        } else if ANDROID_BRANDS.iter().any(|b| brand.starts_with(b)) {
            DeviceType::Android
        } else {
            DeviceType::Other
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldId {
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
}

impl FieldId {
    /// Label used when rendering a listing.
    pub fn title(&self) -> &'static str {
        match self {
            FieldId::Brand => "Бренд",
            FieldId::Model => "Модель",
            FieldId::Memory => "Память",
            FieldId::Ram => "Оперативная память",
            FieldId::Rom => "Встроенная память",
            FieldId::Processor => "Процессор",
            FieldId::Condition => "Состояние",
            FieldId::Battery => "Аккумулятор",
            FieldId::BatteryState => "Состояние батареи",
            FieldId::Color => "Цвет",
            FieldId::Package => "Комплект",
            FieldId::PriceUsd => "Цена (USD)",
            FieldId::PriceKgs => "Цена (KGS)",
            FieldId::Contact => "Контакт",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t),
            FieldValue::Number(_) => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(t) => write!(f, "{}", t),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
        }
    }
}

/// One user's listing-in-progress. Owned exclusively by that user's
/// updates; everything else only sweeps it by idle time.
#[derive(Clone, Debug)]
pub struct ConversationState {
    pub current_step: StepId,
    pub device_type: Option<DeviceType>,
    pub fields: HashMap<FieldId, FieldValue>,
    pub photos: Vec<String>,
    pub step_history: Vec<StepId>,
    /// A censored variant of rejected input, waiting for the user to
    /// accept it explicitly. Never written into `fields` on its own.
    pub pending_censored: Option<String>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_step: StepId::Brand,
            device_type: None,
            fields: HashMap::new(),
            photos: Vec::new(),
            step_history: Vec::new(),
            pending_censored: None,
            last_activity: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}

/// Per-user record. The premium flag is the only thing the payment
/// poller ever mutates here.
#[derive(Clone, Debug)]
pub struct Profile {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub premium: bool,
    pub premium_since: Option<DateTime<Utc>>,
    pub last_menu_message: Option<teloxide::types::MessageId>,
    pub created: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: UserId, chat_id: ChatId, username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            chat_id,
            username,
            premium: false,
            premium_since: None,
            last_menu_message: None,
            created: now,
            last_activity: now,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketCategory {
    Payment,
    Technical,
    Suggestion,
    General,
    Other,
}

impl TicketCategory {
    pub fn title(&self) -> &'static str {
        match self {
            TicketCategory::Payment => "Оплата",
            TicketCategory::Technical => "Техническая проблема",
            TicketCategory::Suggestion => "Предложение",
            TicketCategory::General => "Общий вопрос",
            TicketCategory::Other => "Другое",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketStatus {
    New,
    Pending,
    Answered,
    Solved,
    Closed,
}

impl TicketStatus {
    /// Open tickets take part in duplicate detection.
    pub fn is_open(&self) -> bool {
        matches!(self, TicketStatus::New | TicketStatus::Pending)
    }

    /// Resolved tickets become eligible for garbage collection.
    pub fn is_resolved(&self) -> bool {
        matches!(self, TicketStatus::Solved | TicketStatus::Closed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "new" => Some(TicketStatus::New),
            "pending" => Some(TicketStatus::Pending),
            "answered" => Some(TicketStatus::Answered),
            "solved" => Some(TicketStatus::Solved),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }
}

impl Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketStatus::New => "new",
            TicketStatus::Pending => "pending",
            TicketStatus::Answered => "answered",
            TicketStatus::Solved => "solved",
            TicketStatus::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketSender {
    User,
    Admin,
    System,
}

#[derive(Clone, Debug)]
pub struct TicketMessage {
    pub text: String,
    pub sender: TicketSender,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Ticket {
    pub seq: u64,
    pub user_id: UserId,
    pub category: TicketCategory,
    pub status: TicketStatus,
    pub messages: Vec<TicketMessage>,
    pub duplicate_of: Option<u64>,
    pub created: DateTime<Utc>,
    pub status_changed: DateTime<Utc>,
}

impl Ticket {
    /// Human-displayable id, e.g. `TKT000123`.
    pub fn display_id(&self) -> String {
        format!("TKT{:06}", self.seq)
    }

    /// The message the ticket was opened with; duplicate detection
    /// only ever looks at this one.
    pub fn first_message(&self) -> Option<&TicketMessage> {
        self.messages.first()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvoiceStatus {
    Active,
    Paid,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvoicePurpose {
    Premium,
    Donation,
}

#[derive(Clone, Debug)]
pub struct Invoice {
    /// Id assigned by the payment provider.
    pub id: u64,
    pub user_id: UserId,
    pub amount: f64,
    pub currency: String,
    pub purpose: InvoicePurpose,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Immutable snapshot of a published listing.
#[derive(Clone, Debug)]
pub struct PublishedListing {
    pub user_id: UserId,
    pub device_type: DeviceType,
    pub text: String,
    pub price_usd: f64,
    pub price_kgs: f64,
    pub contact: String,
    pub photos: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// One inbound message kept in the bounded cache.
#[derive(Clone, Debug)]
pub struct CachedMessage {
    pub user_id: UserId,
    pub text: String,
    pub at: DateTime<Utc>,
}
