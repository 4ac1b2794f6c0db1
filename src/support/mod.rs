pub mod tickets;

use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use log::error;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message};

use crate::config::Config;
use crate::prelude::*;
use tickets::{append_message, find_duplicates, new_ticket, parse_ticket_ref, update_status};

pub fn handler() -> HandlerResult {
    Update::filter_message()
        .branch(filter_msg_prefix(BTN_SUPPORT).endpoint(start))
        .branch(
            filter_admin_chat()
                .branch(filter_msg_prefix("/reply").endpoint(admin_reply))
                .branch(filter_msg_prefix("/status").endpoint(admin_status))
                .branch(filter_msg_prefix("/tickets").endpoint(admin_tickets)),
        )
        .branch(
            filter_in_support()
                .branch(filter_msg_prefix(BTN_CANCEL).endpoint(cancel))
                .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(on_text)),
        )
}

fn filter_admin_chat() -> HandlerResult {
    dptree::entry().filter(|msg: Message, config: Arc<Config>| {
        msg.chat.id == ChatId(config.telegram.admin_chat_id)
    })
}

fn filter_in_support() -> HandlerResult {
    dptree::entry().filter_async(|msg: Message, depot: SharedDepot| async move {
        match msg.from() {
            Some(user) => depot.read().await.support_sessions.contains(&user.id),
            None => false,
        }
    })
}

async fn start(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    {
        let mut depot = depot.write().await;
        let profile = handle_user_from_msg(&mut depot, &msg)?;
        remember_message(&mut depot, &msg);
        depot.support_sessions.insert(profile.user_id, Utc::now());
    }

    bot.send_message(
        msg.chat.id,
        concat!(
            "Опишите проблему одним сообщением — мы создадим обращение ",
            "и передадим его оператору."
        ),
    )
    .reply_markup(dialogue_keyboard())
    .await?;

    Ok(())
}

async fn cancel(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    if let Some(user) = msg.from() {
        depot.write().await.support_sessions.remove(&user.id);
    }

    bot.send_message(msg.chat.id, "Хорошо, обращение не создано.")
        .reply_markup(user_keyboard())
        .await?;
    Ok(())
}

/// First unmatched message becomes a ticket. Duplicates against the
/// user's recent open tickets never suppress creation, they are only
/// recorded and surfaced.
async fn on_text(bot: Bot, msg: Message, depot: SharedDepot, config: Arc<Config>) -> Result<()> {
    let Some(text) = msg.text().map(str::to_owned) else {
        return Ok(());
    };

    let (ticket, duplicate, premium) = {
        let mut depot = depot.write().await;
        let profile = handle_user_from_msg(&mut depot, &msg)?;
        remember_message(&mut depot, &msg);

        depot.support_sessions.remove(&profile.user_id);

        let duplicates: Vec<u64> =
            find_duplicates(depot.open_tickets_newest_first(profile.user_id), &text);

        let seq = depot.next_ticket_seq();
        let ticket = new_ticket(
            seq,
            profile.user_id,
            text,
            duplicates.first().copied(),
            Utc::now(),
        );

        depot.tickets.insert(seq, ticket.clone());
        depot.tickets_by_user.insert(profile.user_id, seq);

        let duplicate = duplicates
            .first()
            .and_then(|seq| depot.tickets.get(seq))
            .map(|t| t.display_id());

        (ticket, duplicate, profile.premium)
    };

    let mut reply = format!(
        "✅ Обращение {} создано.\nКатегория: {}.",
        ticket.display_id(),
        ticket.category.title()
    );
    if let Some(duplicate) = duplicate {
        reply.push_str(&format!(
            "\n\n⚠️ Похоже на ваше открытое обращение {} — оператор увидит оба.",
            duplicate
        ));
    }
    bot.send_message(msg.chat.id, reply)
        .reply_markup(user_keyboard())
        .await?;

    let badge = if premium { " ⭐" } else { "" };
    let username = msg
        .from()
        .and_then(|u| u.username.as_ref())
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| "без username".to_owned());
    let notice = bot
        .send_message(
            ChatId(config.telegram.admin_chat_id),
            format!(
                "📨 {} [{}] от {}{}:\n{}",
                ticket.display_id(),
                ticket.category.title(),
                username,
                badge,
                ticket
                    .first_message()
                    .map(|m| m.text.as_str())
                    .unwrap_or_default()
            ),
        )
        .await;
    if let Err(e) = notice {
        error!("admin notice for {} failed: {}", ticket.display_id(), e);
    }

    Ok(())
}

/// `/reply TKT000123 <text>`: appends the answer, flips the status and
/// delivers it. A failed delivery (user blocked the bot) is reported
/// back to the admin and not retried.
async fn admin_reply(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let text = msg.text().unwrap_or_default();
    let mut parts = text.splitn(3, char::is_whitespace);
    parts.next();

    let (Some(reference), Some(body)) = (parts.next(), parts.next()) else {
        bot.send_message(msg.chat.id, "Формат: /reply TKT000123 текст ответа")
            .await?;
        return Ok(());
    };
    let Some(seq) = parse_ticket_ref(reference) else {
        bot.send_message(msg.chat.id, format!("Не понимаю номер «{}».", reference))
            .await?;
        return Ok(());
    };

    let delivery = {
        let mut depot = depot.write().await;

        let Some(ticket) = depot.tickets.get_mut(&seq) else {
            bot.send_message(msg.chat.id, format!("Обращение №{} не найдено.", seq))
                .await?;
            return Ok(());
        };

        append_message(ticket, body.to_owned(), TicketSender::Admin, Utc::now());
        update_status(ticket, TicketStatus::Answered, "admin", Utc::now());
        let display_id = ticket.display_id();
        let user_id = ticket.user_id;

        depot
            .profiles
            .get(&user_id)
            .map(|p| (p.chat_id, display_id))
    };

    let Some((user_chat, display_id)) = delivery else {
        bot.send_message(msg.chat.id, "Пользователь неизвестен, ответ не доставлен.")
            .await?;
        return Ok(());
    };

    match bot
        .send_message(
            user_chat,
            format!("💬 Ответ поддержки по {}:\n{}", display_id, body),
        )
        .await
    {
        Ok(_) => {
            bot.send_message(msg.chat.id, format!("{}: ответ доставлен.", display_id))
                .await?;
        }
        Err(e) => {
            bot.send_message(
                msg.chat.id,
                format!("⚠️ {}: ответ не доставлен ({}).", display_id, e),
            )
            .await?;
        }
    }

    Ok(())
}

/// `/status TKT000123 solved`: transitions are permissive, every
/// change is audited inside the ticket.
async fn admin_status(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let text = msg.text().unwrap_or_default();
    let mut parts = text.split_whitespace();
    parts.next();

    let (Some(reference), Some(status)) = (parts.next(), parts.next()) else {
        bot.send_message(
            msg.chat.id,
            "Формат: /status TKT000123 new|pending|answered|solved|closed",
        )
        .await?;
        return Ok(());
    };

    let Some(seq) = parse_ticket_ref(reference) else {
        bot.send_message(msg.chat.id, format!("Не понимаю номер «{}».", reference))
            .await?;
        return Ok(());
    };
    let Some(status) = TicketStatus::parse(status) else {
        bot.send_message(
            msg.chat.id,
            "Статусы: new, pending, answered, solved, closed.",
        )
        .await?;
        return Ok(());
    };

    let updated = {
        let mut depot = depot.write().await;
        depot.tickets.get_mut(&seq).map(|ticket| {
            update_status(ticket, status, "admin", Utc::now());
            ticket.display_id()
        })
    };

    match updated {
        Some(display_id) => {
            bot.send_message(msg.chat.id, format!("{} → {}.", display_id, status))
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, format!("Обращение №{} не найдено.", seq))
                .await?;
        }
    }

    Ok(())
}

async fn admin_tickets(bot: Bot, msg: Message, depot: SharedDepot) -> Result<()> {
    let lines: Vec<String> = {
        let depot = depot.read().await;
        depot
            .tickets
            .values()
            .filter(|t| t.status.is_open())
            .sorted_by_key(|t| std::cmp::Reverse(t.seq))
            .take(10)
            .map(|t| {
                format!(
                    "{} [{}] {} — {}",
                    t.display_id(),
                    t.status,
                    t.category.title(),
                    t.first_message()
                        .map(|m| m.text.chars().take(40).collect::<String>())
                        .unwrap_or_default()
                )
            })
            .collect()
    };

    let reply = if lines.is_empty() {
        "Открытых обращений нет.".to_owned()
    } else {
        format!("Открытые обращения:\n{}", lines.join("\n"))
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
