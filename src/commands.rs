use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message};

use crate::config::Config;
use crate::prelude::*;
use crate::utils::payload::{Payload, PayloadOp};

pub fn handler() -> HandlerResult {
    Update::filter_message()
        .branch(filter_msg_prefix("/start").endpoint(start))
        .branch(filter_msg_prefix(BTN_HELP).endpoint(help))
        .branch(filter_msg_prefix(BTN_PREMIUM).endpoint(premium))
}

async fn start(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let profile = {
        let mut depot = depot.write().await;
        remember_message(&mut depot, &msg);
        handle_user_from_msg(&mut depot, &msg)?
    };

    bot.send_message(
        msg.chat.id,
        "Привет! Это барахолка смартфонов. Продайте телефон за пару минут 📱",
    )
    .reply_markup(user_keyboard())
    .await?;

    let (text, keyboard) = menu_view(MenuAction::Main, &profile);
    let message_id = send_or_edit(&bot, msg.chat.id, profile.last_menu_message, &text, keyboard).await?;

    depot
        .write()
        .await
        .profiles
        .modify(&profile.user_id, |p| p.last_menu_message = Some(message_id));

    Ok(())
}

async fn help(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let profile = {
        let mut depot = depot.write().await;
        remember_message(&mut depot, &msg);
        handle_user_from_msg(&mut depot, &msg)?
    };

    let (text, keyboard) = menu_view(MenuAction::Help, &profile);
    let message_id = send_or_edit(&bot, msg.chat.id, profile.last_menu_message, &text, keyboard).await?;

    depot
        .write()
        .await
        .profiles
        .modify(&profile.user_id, |p| p.last_menu_message = Some(message_id));

    Ok(())
}

async fn premium(bot: Bot, msg: Message, depot: SharedDepot, config: Arc<Config>) -> Result<()> {
    let profile = {
        let mut depot = depot.write().await;
        remember_message(&mut depot, &msg);
        handle_user_from_msg(&mut depot, &msg)?
    };

    if profile.premium {
        bot.send_message(msg.chat.id, "У вас уже есть премиум-статус ⭐")
            .await?;
        return Ok(());
    }

    let text = format!(
        concat!(
            "⭐ Премиум-статус\n\n",
            "• значок ⭐ в ваших объявлениях\n",
            "• приоритетная поддержка\n\n",
            "Стоимость: {} {}. Оплата через CryptoBot.\n",
            "Можно также просто поддержать проект донатом."
        ),
        config.payment.premium_price, config.payment.asset
    );

    bot.send_message(msg.chat.id, text)
        .reply_markup(
            InlineKeyboardMarkup::default()
                .append_row(vec![InlineKeyboardButton::callback(
                    "💳 Купить премиум",
                    Payload::op_only(PayloadOp::BuyPremium).to_string(),
                )])
                .append_row(vec![
                    InlineKeyboardButton::callback("☕ 5", Payload::donate(5).to_string()),
                    InlineKeyboardButton::callback("☕ 10", Payload::donate(10).to_string()),
                    InlineKeyboardButton::callback("☕ 25", Payload::donate(25).to_string()),
                ]),
        )
        .await?;

    Ok(())
}
