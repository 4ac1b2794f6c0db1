pub mod engine;
pub mod steps;

use chrono::Utc;
use log::error;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, UserId,
};

use crate::config::Config;
use crate::prelude::*;
use crate::publisher;
use crate::utils::payload::{Payload, PayloadOp};
use crate::utils::verify::{self, enrich, ValidationError};
use engine::{Applied, BackOutcome, PhotoReject};
use steps::{Prompt, StepId, MAX_PHOTOS, MIN_PHOTOS};

pub fn handler() -> HandlerResult {
    Update::filter_message()
        .branch(filter_msg_prefix(BTN_SELL).endpoint(start))
        .branch(
            filter_in_wizard()
                .branch(filter_msg_prefix(BTN_CANCEL).endpoint(cancel_msg))
                .branch(filter_msg_prefix(BTN_BACK).endpoint(back_msg))
                .branch(
                    dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(on_photo),
                )
                .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(on_text)),
        )
}

fn filter_in_wizard() -> HandlerResult {
    dptree::entry().filter_async(|msg: Message, depot: SharedDepot| async move {
        match msg.from() {
            Some(user) => depot.read().await.conversations.contains(&user.id),
            None => false,
        }
    })
}

async fn start(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let state = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_msg(&mut depot, &msg)?;
        remember_message(&mut depot, &msg);

        // starting over discards any listing-in-progress
        depot.support_sessions.remove(&profile.user_id);
        let state = ConversationState::new(Utc::now());
        depot.conversations.insert(profile.user_id, state.clone());
        state
    };

    bot.send_message(
        msg.chat.id,
        "Создаём объявление. Диалог можно прервать кнопкой «❌ Отмена».",
    )
    .reply_markup(dialogue_keyboard())
    .await?;

    send_step_prompt(&bot, msg.chat.id, &state).await
}

fn step_keyboard(step: StepId, prompt: &Prompt) -> Option<InlineKeyboardMarkup> {
    if step == StepId::Photos {
        return Some(InlineKeyboardMarkup::default().append_row(vec![
            InlineKeyboardButton::callback(
                "✅ Готово",
                Payload::op_only(PayloadOp::PhotosDone).to_string(),
            ),
        ]));
    }

    if prompt.choices.is_empty() {
        return None;
    }

    let buttons: Vec<_> = prompt
        .choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            InlineKeyboardButton::callback(choice.clone(), Payload::answer(step, i).to_string())
        })
        .collect();

    let mut keyboard = InlineKeyboardMarkup::default();
    for row in buttons.chunks(2) {
        keyboard = keyboard.append_row(row.to_vec());
    }

    Some(keyboard)
}

async fn send_step_prompt(bot: &Bot, chat_id: ChatId, state: &ConversationState) -> Result<()> {
    let prompt = steps::render_step(state.current_step, state);

    let mut request = bot.send_message(chat_id, prompt.text.clone());
    if let Some(keyboard) = step_keyboard(state.current_step, &prompt) {
        request = request.reply_markup(keyboard);
    }
    request.await?;

    Ok(())
}

enum TextOutcome {
    Advanced {
        state: ConversationState,
        hint: Option<&'static str>,
    },
    Preview {
        state: ConversationState,
        premium: bool,
    },
    Rejected {
        message: String,
        censored: Option<String>,
    },
}

async fn on_text(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let Some(text) = msg.text().map(str::to_owned) else {
        return Ok(());
    };

    let outcome = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_msg(&mut depot, &msg)?;
        remember_message(&mut depot, &msg);

        let Some(state) = depot.conversations.get_mut(&profile.user_id) else {
            return Ok(());
        };
        let step_before = state.current_step;

        if step_before == StepId::Photos {
            TextOutcome::Rejected {
                message: format!(
                    "Сейчас жду фотографии (от {} до {}). Пришлите фото или нажмите «✅ Готово».",
                    MIN_PHOTOS, MAX_PHOTOS
                ),
                censored: None,
            }
        } else {
            match engine::apply_answer(state, &text, Utc::now()) {
                Ok(applied) => {
                    let hint = price_hint_after(state, step_before);
                    let state = state.clone();
                    match applied {
                        Applied::Advanced(_) => TextOutcome::Advanced { state, hint },
                        Applied::ReadyForPreview => TextOutcome::Preview {
                            state,
                            premium: profile.premium,
                        },
                    }
                }
                Err(ValidationError::Profanity { censored }) => {
                    state.pending_censored = Some(censored.clone());
                    TextOutcome::Rejected {
                        message: ValidationError::Profanity {
                            censored: censored.clone(),
                        }
                        .to_string(),
                        censored: Some(censored),
                    }
                }
                Err(e) => TextOutcome::Rejected {
                    message: e.to_string(),
                    censored: None,
                },
            }
        }
    };

    match outcome {
        TextOutcome::Advanced { state, hint } => {
            if let Some(hint) = hint {
                bot.send_message(msg.chat.id, hint).await?;
            }
            send_step_prompt(&bot, msg.chat.id, &state).await
        }
        TextOutcome::Preview { state, premium } => {
            send_preview(&bot, msg.chat.id, &state, premium).await
        }
        TextOutcome::Rejected { message, censored } => {
            let mut request = bot.send_message(msg.chat.id, message);
            if let Some(censored) = censored {
                request = request.reply_markup(InlineKeyboardMarkup::default().append_row(vec![
                    InlineKeyboardButton::callback(
                        format!("Заменить на «{}»", censored),
                        Payload::op_only(PayloadOp::AcceptCensored).to_string(),
                    ),
                ]));
            }
            request.await?;
            Ok(())
        }
    }
}

/// A soft warning right after a USD price lands outside the typical
/// market window for the chosen model.
fn price_hint_after(state: &ConversationState, answered: StepId) -> Option<&'static str> {
    if answered != StepId::PriceUsd {
        return None;
    }

    let model = state.fields.get(&FieldId::Model)?.as_text()?;
    let price = state.fields.get(&FieldId::PriceUsd)?.as_number()?;

    enrich::price_hint(model, price).map(|h| h.message())
}

async fn on_photo(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let Some(file_id) = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|photo| photo.file.id.clone())
    else {
        return Ok(());
    };

    let result = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_msg(&mut depot, &msg)?;

        match depot.conversations.get_mut(&profile.user_id) {
            Some(state) => engine::add_photo(state, file_id, Utc::now()),
            None => return Ok(()),
        }
    };

    let reply = match result {
        Ok(count) if count >= MIN_PHOTOS => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Фото {}/{}. Можно добавить ещё или нажать «✅ Готово».",
                    count, MAX_PHOTOS
                ),
            )
            .reply_markup(InlineKeyboardMarkup::default().append_row(vec![
                InlineKeyboardButton::callback(
                    "✅ Готово",
                    Payload::op_only(PayloadOp::PhotosDone).to_string(),
                ),
            ]))
            .await?;
            return Ok(());
        }
        Ok(count) => format!(
            "Фото {}/{}. Нужно минимум {}.",
            count, MAX_PHOTOS, MIN_PHOTOS
        ),
        Err(PhotoReject::AlbumFull) => {
            format!("Максимум {} фото. Нажмите «✅ Готово».", MAX_PHOTOS)
        }
        Err(PhotoReject::NotAtPhotoStep) => {
            "Фотографии понадобятся позже, сейчас ответьте на вопрос выше.".to_owned()
        }
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn send_preview(
    bot: &Bot,
    chat_id: ChatId,
    state: &ConversationState,
    premium: bool,
) -> Result<()> {
    let text = format!(
        "⚫️ Предпросмотр\n\n{}\n\n📷 Фото: {}",
        publisher::format_listing(state, premium),
        state.photos.len()
    );

    bot.send_message(chat_id, text)
        .reply_markup(
            InlineKeyboardMarkup::default()
                .append_row(vec![InlineKeyboardButton::callback(
                    "✅ Опубликовать",
                    Payload::op_only(PayloadOp::Publish).to_string(),
                )])
                .append_row(vec![
                    InlineKeyboardButton::callback(
                        "⬅️ Назад",
                        Payload::op_only(PayloadOp::Back).to_string(),
                    ),
                    InlineKeyboardButton::callback(
                        "❌ Отмена",
                        Payload::op_only(PayloadOp::Cancel).to_string(),
                    ),
                ]),
        )
        .await?;

    Ok(())
}

async fn cancel_msg(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    do_cancel(&bot, &depot, user.id, msg.chat.id).await
}

async fn back_msg(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    do_back(&bot, &depot, user.id, msg.chat.id).await
}

/// Cancellation is unconditional: the whole state is discarded and the
/// user lands back on the main keyboard.
pub async fn do_cancel(
    bot: &Bot,
    depot: &SharedDepot,
    user_id: UserId,
    chat_id: ChatId,
) -> Result<()> {
    depot.write().await.conversations.remove(&user_id);

    bot.send_message(chat_id, "Диалог отменён.")
        .reply_markup(user_keyboard())
        .await?;
    Ok(())
}

pub async fn do_back(
    bot: &Bot,
    depot: &SharedDepot,
    user_id: UserId,
    chat_id: ChatId,
) -> Result<()> {
    let outcome = {
        let mut depot = depot.write().await;
        match depot.conversations.get_mut(&user_id) {
            Some(state) => {
                let outcome = engine::go_back(state, Utc::now());
                (outcome, state.clone())
            }
            None => return Ok(()),
        }
    };

    match outcome {
        (BackOutcome::AtFirstStep, _) => {
            bot.send_message(chat_id, "Возвращаться некуда, это первый шаг.")
                .await?;
            Ok(())
        }
        (BackOutcome::Moved(_), state) => send_step_prompt(bot, chat_id, &state).await,
    }
}

/// A choice button. Brand buttons stay live for the whole dialogue so
/// the user can switch the branch mid-way; for any other step a press
/// on an outdated keyboard is refused.
pub async fn on_choice(
    bot: Bot,
    q: CallbackQuery,
    depot: SharedDepot,
    step: StepId,
    choice: usize,
) -> Result<()> {
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(q.from.id.0 as i64));

    let outcome = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_callback(&mut depot, &q)?;

        let Some(state) = depot.conversations.get_mut(&profile.user_id) else {
            bot.answer_callback_query(q.id.clone())
                .text("Объявление уже не редактируется.")
                .await?;
            return Ok(());
        };

        if step != StepId::Brand && step != state.current_step {
            bot.answer_callback_query(q.id.clone())
                .text("Эта кнопка устарела.")
                .await?;
            return Ok(());
        }

        let prompt = steps::render_step(step, state);
        let Some(answer) = prompt.choices.get(choice).cloned() else {
            bot.answer_callback_query(q.id.clone())
                .text("Эта кнопка устарела.")
                .await?;
            return Ok(());
        };

        let applied = if step == StepId::Brand {
            engine::select_brand(state, &answer, Utc::now()).map(Applied::Advanced)
        } else {
            engine::apply_answer(state, &answer, Utc::now())
        };

        match applied {
            Ok(Applied::Advanced(_)) => Some((state.clone(), profile.premium, false)),
            Ok(Applied::ReadyForPreview) => Some((state.clone(), profile.premium, true)),
            Err(e) => {
                bot.answer_callback_query(q.id.clone())
                    .text(e.to_string())
                    .show_alert(true)
                    .await?;
                None
            }
        }
    };

    if let Some((state, premium, preview)) = outcome {
        bot.answer_callback_query(q.id).await?;
        if preview {
            send_preview(&bot, chat_id, &state, premium).await?;
        } else {
            send_step_prompt(&bot, chat_id, &state).await?;
        }
    }

    Ok(())
}

pub async fn on_photos_done(bot: Bot, q: CallbackQuery, depot: SharedDepot) -> Result<()> {
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(q.from.id.0 as i64));

    let ready = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_callback(&mut depot, &q)?;

        match depot.conversations.get(&profile.user_id) {
            Some(state) if engine::ready_for_preview(state) => {
                Some((state.clone(), profile.premium))
            }
            Some(_) => None,
            None => return Ok(()),
        }
    };

    match ready {
        Some((state, premium)) => {
            bot.answer_callback_query(q.id).await?;
            send_preview(&bot, chat_id, &state, premium).await
        }
        None => {
            bot.answer_callback_query(q.id)
                .text(format!("Нужно минимум {} фото.", MIN_PHOTOS))
                .show_alert(true)
                .await?;
            Ok(())
        }
    }
}

pub async fn on_accept_censored(bot: Bot, q: CallbackQuery, depot: SharedDepot) -> Result<()> {
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(q.from.id.0 as i64));

    let outcome = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_callback(&mut depot, &q)?;

        let Some(state) = depot.conversations.get_mut(&profile.user_id) else {
            return Ok(());
        };
        let Some(censored) = state.pending_censored.take() else {
            bot.answer_callback_query(q.id.clone())
                .text("Заменять уже нечего.")
                .await?;
            return Ok(());
        };

        match engine::apply_answer(state, &censored, Utc::now()) {
            Ok(applied) => Some((state.clone(), profile.premium, applied)),
            Err(e) => {
                bot.answer_callback_query(q.id.clone())
                    .text(e.to_string())
                    .show_alert(true)
                    .await?;
                None
            }
        }
    };

    if let Some((state, premium, applied)) = outcome {
        bot.answer_callback_query(q.id).await?;
        match applied {
            Applied::ReadyForPreview => send_preview(&bot, chat_id, &state, premium).await?,
            Applied::Advanced(_) => send_step_prompt(&bot, chat_id, &state).await?,
        }
    }

    Ok(())
}

/// Publishes the previewed listing. Unless the duplicate warning was
/// already acknowledged, a near-copy of a recent listing of the same
/// user turns into a warning with an explicit "publish anyway" button.
/// State is cleared only after the channel post is confirmed.
pub async fn on_publish(
    bot: Bot,
    q: CallbackQuery,
    depot: SharedDepot,
    config: std::sync::Arc<Config>,
    skip_duplicate_check: bool,
) -> Result<()> {
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(q.from.id.0 as i64));

    let prepared = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_callback(&mut depot, &q)?;

        let Some(state) = depot.conversations.get(&profile.user_id) else {
            bot.answer_callback_query(q.id.clone())
                .text("Объявление уже не редактируется.")
                .await?;
            return Ok(());
        };

        if !engine::ready_for_preview(state) {
            bot.answer_callback_query(q.id.clone())
                .text("Объявление ещё не заполнено до конца.")
                .show_alert(true)
                .await?;
            return Ok(());
        }

        let rendered = publisher::format_listing(state, profile.premium);
        let similar = if skip_duplicate_check {
            None
        } else {
            verify::find_similar_listing(&rendered, depot.recent_listings(profile.user_id))
                .map(|(_, score)| score)
        };

        (state.clone(), profile.premium, similar)
    };

    let (state, premium, similar) = prepared;
    bot.answer_callback_query(q.id.clone()).await?;

    if let Some(score) = similar {
        bot.send_message(
            chat_id,
            format!(
                "⚠️ Очень похоже на ваше недавнее объявление (совпадение {}%).\nОпубликовать всё равно?",
                (score * 100.0).round() as u32
            ),
        )
        .reply_markup(InlineKeyboardMarkup::default().append_row(vec![
            InlineKeyboardButton::callback(
                "✅ Опубликовать всё равно",
                Payload::op_only(PayloadOp::PublishAnyway).to_string(),
            ),
        ]))
        .await?;
        return Ok(());
    }

    let channel = ChatId(config.telegram.channel_id);
    match publisher::publish(&bot, channel, q.from.id, &state, premium).await {
        Ok(listing) => {
            let mut depot = depot.write().await;
            depot.listings.push(listing);
            depot.conversations.remove(&q.from.id);
            drop(depot);

            bot.send_message(chat_id, "✅ Объявление опубликовано в канале.")
                .reply_markup(user_keyboard())
                .await?;
            Ok(())
        }
        Err(e) => {
            // state is intentionally kept so the user can retry
            error!("publish for {} failed: {}", q.from.id.0, e);
            bot.send_message(
                chat_id,
                "Не получилось опубликовать, попробуйте ещё раз чуть позже. Черновик сохранён.",
            )
            .await?;
            Ok(())
        }
    }
}
