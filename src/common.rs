use chrono::Utc;
use log::debug;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
    KeyboardMarkup, Message, MessageId, ReplyMarkup, Update, UpdateKind, UserId,
};

use crate::depot::prelude::*;
use crate::entries::prelude::*;
use crate::utils::payload::Payload;
use crate::{BotError, HandlerResult, Result};

pub const BTN_SELL: &str = "📱 Продать телефон";
pub const BTN_SUPPORT: &str = "💬 Поддержка";
pub const BTN_PREMIUM: &str = "⭐ Премиум";
pub const BTN_HELP: &str = "❓ Помощь";
pub const BTN_CANCEL: &str = "❌ Отмена";
pub const BTN_BACK: &str = "⬅️ Назад";

/// Looks the profile up, creating it on first contact, and keeps the
/// chat id and username fresh.
pub fn handle_user(
    depot: &mut Depot,
    user_id: UserId,
    chat_id: ChatId,
    username: Option<String>,
) -> Profile {
    let now = Utc::now();

    let profile = depot
        .profiles
        .entry_or_insert_with(user_id, || Profile::new(user_id, chat_id, username.clone(), now));

    profile.chat_id = chat_id;
    if username.is_some() {
        profile.username = username;
    }
    profile.last_activity = now;

    profile.clone()
}

pub fn handle_user_from_msg(depot: &mut Depot, msg: &Message) -> Result<Profile> {
    let user = msg
        .from()
        .ok_or_else(|| BotError::unknown("message has no sender"))?;

    Ok(handle_user(
        depot,
        user.id,
        msg.chat.id,
        user.username.clone(),
    ))
}

pub fn handle_user_from_callback(depot: &mut Depot, q: &CallbackQuery) -> Result<Profile> {
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(q.from.id.0 as i64));

    Ok(handle_user(depot, q.from.id, chat_id, q.from.username.clone()))
}

pub fn filter_msg_prefix(prefix: &'static str) -> HandlerResult {
    dptree::entry().filter(move |msg: Message| {
        msg.text().map(|t| t.starts_with(prefix)).unwrap_or(false)
    })
}

pub fn user_keyboard() -> ReplyMarkup {
    ReplyMarkup::Keyboard(KeyboardMarkup {
        keyboard: vec![
            vec![KeyboardButton::new(BTN_SELL)],
            vec![
                KeyboardButton::new(BTN_SUPPORT),
                KeyboardButton::new(BTN_PREMIUM),
            ],
            vec![KeyboardButton::new(BTN_HELP)],
        ],
        is_persistent: true,
        resize_keyboard: Some(true),
        ..Default::default()
    })
}

/// Shown for the whole lifetime of a wizard or support dialogue.
pub fn dialogue_keyboard() -> ReplyMarkup {
    ReplyMarkup::Keyboard(KeyboardMarkup {
        keyboard: vec![vec![
            KeyboardButton::new(BTN_BACK),
            KeyboardButton::new(BTN_CANCEL),
        ]],
        is_persistent: true,
        resize_keyboard: Some(true),
        ..Default::default()
    })
}

/// Edits the previous menu message in place; when Telegram refuses the
/// edit (too old, already edited, deleted) falls back to a fresh send.
pub async fn send_or_edit(
    bot: &Bot,
    chat_id: ChatId,
    last: Option<MessageId>,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) -> Result<MessageId> {
    if let Some(message_id) = last {
        let edited = bot
            .edit_message_text(chat_id, message_id, text)
            .reply_markup(keyboard.clone())
            .await;

        match edited {
            Ok(_) => return Ok(message_id),
            Err(e) => debug!("edit of message {} failed, sending fresh: {}", message_id.0, e),
        }
    }

    let msg = bot.send_message(chat_id, text).reply_markup(keyboard).await?;
    Ok(msg.id)
}

/// The internal command both transports translate into: a callback
/// press carries it in the payload, a free-text message is matched
/// against the keyword table below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum MenuAction {
    Main = 0,
    Profile,
    Help,
}

impl MenuAction {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        FromPrimitive::from_u8(code)
    }

    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.to_lowercase();

        [
            ("меню", MenuAction::Main),
            ("профиль", MenuAction::Profile),
            ("помощь", MenuAction::Help),
        ]
        .into_iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, action)| action)
    }
}

pub fn menu_view(action: MenuAction, profile: &Profile) -> (String, InlineKeyboardMarkup) {
    match action {
        MenuAction::Main => (
            concat!(
                "⚫️ Телебазар\n\n",
                "Барахолка смартфонов.\n",
                "Создайте объявление за пару минут.\n\n",
                "Выберите раздел:"
            )
            .to_owned(),
            InlineKeyboardMarkup::default()
                .append_row(vec![InlineKeyboardButton::callback(
                    "👤 Профиль",
                    Payload::menu(MenuAction::Profile.code()).to_string(),
                )])
                .append_row(vec![InlineKeyboardButton::callback(
                    "❓ Помощь",
                    Payload::menu(MenuAction::Help.code()).to_string(),
                )]),
        ),
        MenuAction::Profile => {
            let status = if profile.premium {
                "⭐ Премиум"
            } else {
                "Обычный"
            };
            let since = profile
                .premium_since
                .map(|d| format!("\nПремиум с {}", d.format("%d.%m.%y")))
                .unwrap_or_default();

            (
                format!(
                    "⚫️ Профиль\n\nID: {}\nUsername: {}\n\nСтатус: {}{}",
                    profile.user_id.0,
                    profile
                        .username
                        .as_ref()
                        .map(|u| format!("@{}", u))
                        .unwrap_or_else(|| "—".to_owned()),
                    status,
                    since
                ),
                back_keyboard(),
            )
        }
        MenuAction::Help => (
            concat!(
                "⚫️ Помощь\n\n",
                "1. Как подать объявление?\n",
                "Кнопка «📱 Продать телефон».\n\n",
                "2. Сколько фото можно приложить?\n",
                "От 2 до 4.\n\n",
                "3. Что даёт премиум?\n",
                "Значок ⭐ в объявлениях и приоритетную поддержку.\n\n",
                "Остальные вопросы — через «💬 Поддержка»."
            )
            .to_owned(),
            back_keyboard(),
        ),
    }
}

fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![InlineKeyboardButton::callback(
        "← Назад",
        Payload::menu(MenuAction::Main.code()).to_string(),
    )])
}

/// Remembers an inbound text in the bounded cache.
pub fn remember_message(depot: &mut Depot, msg: &Message) {
    if let (Some(user), Some(text)) = (msg.from(), msg.text()) {
        depot.messages.push(CachedMessage {
            user_id: user.id,
            text: text.to_owned(),
            at: Utc::now(),
        });
    }
}

/// Catch-all: routes recognized keywords through the same `MenuAction`
/// path as the buttons, otherwise nudges towards the menu.
pub async fn default_handler(bot: Bot, upd: Update, depot: SharedDepot) -> Result<()> {
    let UpdateKind::Message(ref msg) = upd.kind else {
        debug!("unhandled update: {:?}", upd);
        return Ok(());
    };

    if msg.via_bot.is_some() {
        return Ok(());
    }

    let profile = {
        let mut depot = depot.write().await;
        remember_message(&mut depot, msg);
        handle_user_from_msg(&mut depot, msg)?
    };

    let action = msg
        .text()
        .and_then(MenuAction::from_text)
        .unwrap_or(MenuAction::Main);

    let (text, keyboard) = menu_view(action, &profile);
    let message_id = send_or_edit(
        &bot,
        msg.chat.id,
        profile.last_menu_message,
        &text,
        keyboard,
    )
    .await?;

    depot
        .write()
        .await
        .profiles
        .modify(&profile.user_id, |p| p.last_menu_message = Some(message_id));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_routing_matches_menu_actions() {
        assert_eq!(MenuAction::from_text("покажи Профиль"), Some(MenuAction::Profile));
        assert_eq!(MenuAction::from_text("ПОМОЩЬ нужна"), Some(MenuAction::Help));
        assert_eq!(MenuAction::from_text("главное меню"), Some(MenuAction::Main));
        assert_eq!(MenuAction::from_text("просто текст"), None);
    }

    #[test]
    fn menu_codes_round_trip() {
        for action in [MenuAction::Main, MenuAction::Profile, MenuAction::Help] {
            assert_eq!(MenuAction::from_code(action.code()), Some(action));
        }
        assert_eq!(MenuAction::from_code(9), None);
    }
}
