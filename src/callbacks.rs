use std::sync::Arc;

use chrono::Utc;
use log::{debug, error};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup};

use crate::config::Config;
use crate::payment::{self, PaymentProvider};
use crate::prelude::*;
use crate::utils::payload::{Payload, PayloadOp};
use crate::utils::verify;
use crate::wizard;

pub fn handler() -> HandlerResult {
    dptree::entry().branch(Update::filter_callback_query().endpoint(dispatch))
}

fn chat_of(q: &CallbackQuery) -> ChatId {
    q.message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(q.from.id.0 as i64))
}

/// Every inline button lands here; both transports (button press and
/// recognized free text) end up in the same internal commands.
async fn dispatch(
    bot: Bot,
    q: CallbackQuery,
    depot: SharedDepot,
    config: Arc<Config>,
    provider: Arc<dyn PaymentProvider + Send + Sync>,
) -> Result<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    let payload: Payload = match data.parse() {
        Ok(payload) => payload,
        Err(e) => {
            debug!("unparsable callback payload: {}", e);
            return Ok(());
        }
    };

    match payload.op {
        PayloadOp::Answer => {
            let (Some(step), Some(choice)) = (payload.step_id(), payload.choice) else {
                return Ok(());
            };
            wizard::on_choice(bot, q, depot, step, choice).await
        }
        PayloadOp::Back => {
            let chat_id = chat_of(&q);
            bot.answer_callback_query(q.id.clone()).await?;
            wizard::do_back(&bot, &depot, q.from.id, chat_id).await
        }
        PayloadOp::Cancel => {
            let chat_id = chat_of(&q);
            depot.write().await.support_sessions.remove(&q.from.id);
            bot.answer_callback_query(q.id.clone()).await?;
            wizard::do_cancel(&bot, &depot, q.from.id, chat_id).await
        }
        PayloadOp::PhotosDone => wizard::on_photos_done(bot, q, depot).await,
        PayloadOp::Publish => wizard::on_publish(bot, q, depot, config, false).await,
        PayloadOp::PublishAnyway => wizard::on_publish(bot, q, depot, config, true).await,
        PayloadOp::AcceptCensored => wizard::on_accept_censored(bot, q, depot).await,
        PayloadOp::BuyPremium => {
            let amount = config.payment.premium_price;
            create_and_send_invoice(
                &bot,
                &q,
                &depot,
                &config,
                provider,
                amount,
                InvoicePurpose::Premium,
                "Премиум-статус в Телебазаре",
            )
            .await
        }
        PayloadOp::Donate => {
            let Some(amount) = payload.amount else {
                return Ok(());
            };
            if let Err(e) = verify::price(&amount.to_string(), &verify::DONATION_PRICE) {
                bot.answer_callback_query(q.id.clone())
                    .text(e.to_string())
                    .show_alert(true)
                    .await?;
                return Ok(());
            }
            create_and_send_invoice(
                &bot,
                &q,
                &depot,
                &config,
                provider,
                amount as f64,
                InvoicePurpose::Donation,
                "Поддержка Телебазара",
            )
            .await
        }
        PayloadOp::Menu => {
            let Some(action) = payload.menu.and_then(MenuAction::from_code) else {
                return Ok(());
            };
            menu_nav(bot, q, depot, action).await
        }
        PayloadOp::None => Ok(()),
    }
}

async fn menu_nav(
    bot: Bot,
    q: CallbackQuery,
    depot: SharedDepot,
    action: MenuAction,
) -> Result<()> {
    let profile = {
        let mut depot = depot.write().await;
        handle_user_from_callback(&mut depot, &q)?
    };

    let (text, keyboard) = menu_view(action, &profile);
    let message_id = send_or_edit(
        &bot,
        chat_of(&q),
        q.message.as_ref().map(|m| m.id),
        &text,
        keyboard,
    )
    .await?;

    depot
        .write()
        .await
        .profiles
        .modify(&profile.user_id, |p| p.last_menu_message = Some(message_id));

    bot.answer_callback_query(q.id).await?;
    Ok(())
}

/// Asks the provider for an invoice and hands the pay link to the user.
/// Provider failures degrade to a "try later" message; the next attempt
/// is the user's, not an automatic retry.
#[allow(clippy::too_many_arguments)]
async fn create_and_send_invoice(
    bot: &Bot,
    q: &CallbackQuery,
    depot: &SharedDepot,
    config: &Config,
    provider: Arc<dyn PaymentProvider + Send + Sync>,
    amount: f64,
    purpose: InvoicePurpose,
    description: &str,
) -> Result<()> {
    let chat_id = chat_of(q);
    let purpose_tag = match purpose {
        InvoicePurpose::Premium => "premium",
        InvoicePurpose::Donation => "donation",
    };
    let provider_payload = format!("{}:{}", purpose_tag, q.from.id.0);

    let created = match provider
        .create_invoice(amount, description, &provider_payload)
        .await
    {
        Ok(created) => created,
        Err(e) => {
            error!("createInvoice for {} failed: {}", q.from.id.0, e);
            bot.answer_callback_query(q.id.clone()).await?;
            bot.send_message(
                chat_id,
                "Платёжный сервис сейчас недоступен. Попробуйте позже.",
            )
            .await?;
            return Ok(());
        }
    };

    {
        let mut depot = depot.write().await;
        handle_user_from_callback(&mut depot, q)?;
        depot.invoices.insert(
            created.id,
            payment::new_invoice(
                &created,
                q.from.id,
                amount,
                &config.payment.asset,
                purpose,
                Utc::now(),
            ),
        );
    }

    bot.answer_callback_query(q.id.clone()).await?;

    let text = format!(
        "Счёт на {} {} создан. После оплаты статус обновится автоматически в течение минуты.",
        amount, config.payment.asset
    );
    match created.pay_url.parse() {
        Ok(url) => {
            bot.send_message(chat_id, text)
                .reply_markup(InlineKeyboardMarkup::default().append_row(vec![
                    InlineKeyboardButton::url("💳 Оплатить".to_owned(), url),
                ]))
                .await?;
        }
        Err(_) => {
            bot.send_message(chat_id, format!("{}\nСсылка: {}", text, created.pay_url))
                .await?;
        }
    }

    Ok(())
}
