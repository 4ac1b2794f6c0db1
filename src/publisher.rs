use chrono::Utc;
use itertools::Itertools;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto,
};

use crate::entries::{ConversationState, DeviceType, FieldId, FieldValue, PublishedListing};
use crate::{BotError, Result};

const PLACEHOLDER: &str = "не указано";

fn field_line(state: &ConversationState, field: FieldId) -> String {
    let value = state
        .fields
        .get(&field)
        .map(|v| match (field, v) {
            // the iPhone battery field is a bare percentage
            (FieldId::Battery, FieldValue::Number(_)) => format!("{}%", v),
            _ => v.to_string(),
        })
        .unwrap_or_else(|| PLACEHOLDER.to_owned());

    format!("▫️ {}: {}", field.title(), value)
}

fn spec_fields(device: DeviceType) -> &'static [FieldId] {
    match device {
        DeviceType::Iphone => &[
            FieldId::Memory,
            FieldId::Condition,
            FieldId::Battery,
            FieldId::Color,
            FieldId::Package,
        ],
        DeviceType::Android => &[
            FieldId::Ram,
            FieldId::Rom,
            FieldId::Processor,
            FieldId::Condition,
            FieldId::BatteryState,
            FieldId::Color,
        ],
        DeviceType::Other => &[FieldId::Condition, FieldId::Color],
    }
}

/// Deterministic per-branch template. Missing optional values render as
/// a placeholder instead of failing the whole post.
pub fn format_listing(state: &ConversationState, premium_seller: bool) -> String {
    let device = state.device_type.unwrap_or(DeviceType::Other);

    let text = |field: FieldId| {
        state
            .fields
            .get(&field)
            .map(|v| v.to_string())
            .unwrap_or_else(|| PLACEHOLDER.to_owned())
    };

    let mut lines = vec![format!(
        "📱 {} {}",
        text(FieldId::Brand),
        text(FieldId::Model)
    )];

    lines.extend(spec_fields(device).iter().map(|f| field_line(state, *f)));

    lines.push(format!(
        "💵 Цена: {} USD / {} KGS",
        text(FieldId::PriceUsd),
        text(FieldId::PriceKgs)
    ));
    lines.push(format!("📞 Контакт: {}", text(FieldId::Contact)));

    if premium_seller {
        lines.push("⭐ Продавец с премиум-статусом".to_owned());
    }

    lines.iter().join("\n")
}

/// A "contact the seller" button when the contact resolves to a handle
/// or a phone number. Anything else gets no button; the contact is
/// still printed in the post body.
fn contact_button(contact: &str) -> Option<InlineKeyboardMarkup> {
    let url = if let Some(handle) = contact.strip_prefix('@') {
        format!("https://t.me/{}", handle)
    } else {
        let digits: String = contact.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        format!("https://t.me/+{}", digits)
    };

    let url = url.parse().ok()?;
    Some(InlineKeyboardMarkup::default().append_row(vec![
        InlineKeyboardButton::url("💬 Написать продавцу".to_owned(), url),
    ]))
}

/// Posts the listing to the channel. Photos go out as one album with
/// the caption on the first photo; Telegram does not attach buttons to
/// album captions, so the contact action follows as a separate message.
/// With no photos the post is text-only and carries the button itself.
///
/// On error the caller keeps the wizard state so the user can retry.
pub async fn publish(
    bot: &Bot,
    channel: ChatId,
    seller: teloxide::types::UserId,
    state: &ConversationState,
    premium_seller: bool,
) -> Result<PublishedListing> {
    let text = format_listing(state, premium_seller);

    let contact = state
        .fields
        .get(&FieldId::Contact)
        .and_then(|v| v.as_text())
        .ok_or_else(|| BotError::wizard("contact missing at publish time"))?
        .to_owned();
    let price_usd = state
        .fields
        .get(&FieldId::PriceUsd)
        .and_then(|v| v.as_number())
        .ok_or_else(|| BotError::wizard("price missing at publish time"))?;
    let price_kgs = state
        .fields
        .get(&FieldId::PriceKgs)
        .and_then(|v| v.as_number())
        .ok_or_else(|| BotError::wizard("price missing at publish time"))?;

    let button = contact_button(&contact);

    if state.photos.is_empty() {
        let request = bot.send_message(channel, &text);
        match button {
            Some(keyboard) => {
                request.reply_markup(keyboard).await?;
            }
            None => {
                request.await?;
            }
        }
    } else {
        let album: Vec<InputMedia> = state
            .photos
            .iter()
            .enumerate()
            .map(|(i, file_id)| {
                let mut photo = InputMediaPhoto::new(InputFile::file_id(file_id.clone()));
                if i == 0 {
                    photo = photo.caption(text.clone());
                }
                InputMedia::Photo(photo)
            })
            .collect();

        bot.send_media_group(channel, album).await?;

        if let Some(keyboard) = button {
            bot.send_message(channel, "Связаться с продавцом:")
                .reply_markup(keyboard)
                .await?;
        }
    }

    Ok(PublishedListing {
        user_id: seller,
        device_type: state.device_type.unwrap_or(DeviceType::Other),
        text,
        price_usd,
        price_kgs,
        contact,
        photos: state.photos.clone(),
        published_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state_with(pairs: &[(FieldId, FieldValue)], device: DeviceType) -> ConversationState {
        let mut state = ConversationState::new(Utc::now());
        state.device_type = Some(device);
        for (field, value) in pairs {
            state.fields.insert(*field, value.clone());
        }
        state
    }

    #[test]
    fn iphone_template_renders_all_lines() {
        let state = state_with(
            &[
                (FieldId::Brand, FieldValue::Text("Apple".into())),
                (FieldId::Model, FieldValue::Text("iPhone 13".into())),
                (FieldId::Memory, FieldValue::Text("128 ГБ".into())),
                (FieldId::Condition, FieldValue::Text("Хорошее".into())),
                (FieldId::Battery, FieldValue::Number(87.0)),
                (FieldId::Color, FieldValue::Text("Чёрный".into())),
                (FieldId::Package, FieldValue::Text("Полный комплект".into())),
                (FieldId::PriceUsd, FieldValue::Number(450.0)),
                (FieldId::PriceKgs, FieldValue::Number(39000.0)),
                (FieldId::Contact, FieldValue::Text("@seller".into())),
            ],
            DeviceType::Iphone,
        );

        let text = format_listing(&state, false);

        assert!(text.starts_with("📱 Apple iPhone 13"));
        assert!(text.contains("Аккумулятор: 87%"));
        assert!(text.contains("450 USD / 39000 KGS"));
        assert!(text.contains("@seller"));
        assert!(!text.contains("⭐"));
    }

    #[test]
    fn missing_field_renders_placeholder() {
        let state = state_with(
            &[
                (FieldId::Brand, FieldValue::Text("Samsung".into())),
                (FieldId::Model, FieldValue::Text("Galaxy S22".into())),
            ],
            DeviceType::Android,
        );

        let text = format_listing(&state, false);
        assert!(text.contains("не указано"));
    }

    #[test]
    fn premium_seller_gets_a_badge() {
        let state = state_with(
            &[(FieldId::Brand, FieldValue::Text("Apple".into()))],
            DeviceType::Iphone,
        );

        assert!(format_listing(&state, true).contains("⭐ Продавец с премиум-статусом"));
    }

    #[test]
    fn contact_button_for_handle_and_phone() {
        assert!(contact_button("@seller_kg").is_some());
        assert!(contact_button("+996700123456").is_some());
        assert!(contact_button("пишите в личку").is_none());
    }
}
