use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Deserialize;
use teloxide::prelude::*;
use teloxide::types::ChatId;

use crate::config::PaymentConfig;
use crate::depot::{Depot, SharedDepot};
use crate::entries::{Invoice, InvoiceStatus};
use crate::{BotError, Result};

/// Any confirmed payment at or above this amount grants premium.
pub const PREMIUM_ACTIVATION_THRESHOLD: f64 = 3.0;

pub struct CreatedInvoice {
    pub id: u64,
    pub pay_url: String,
}

/// What we consume of the provider: create an invoice, ask its status.
/// The provider is eventually consistent and only ever polled; no
/// webhook is assumed.
#[async_trait]
pub trait PaymentProvider {
    async fn create_invoice(
        &self,
        amount: f64,
        description: &str,
        payload: &str,
    ) -> Result<CreatedInvoice>;

    async fn invoice_status(&self, id: u64) -> Result<InvoiceStatus>;
}

/// CryptoBot-style HTTP client.
pub struct CryptoPay {
    http: reqwest::Client,
    base: String,
    token: String,
    asset: String,
}

impl CryptoPay {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: config.api_base.trim_end_matches('/').to_owned(),
            token: config.api_token.clone(),
            asset: config.asset.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiInvoice {
    invoice_id: u64,
    status: String,
    #[serde(default)]
    pay_url: String,
}

#[derive(Deserialize)]
struct ApiInvoiceList {
    items: Vec<ApiInvoice>,
}

fn parse_status(status: &str) -> InvoiceStatus {
    match status {
        "paid" => InvoiceStatus::Paid,
        "expired" => InvoiceStatus::Expired,
        _ => InvoiceStatus::Active,
    }
}

#[async_trait]
impl PaymentProvider for CryptoPay {
    async fn create_invoice(
        &self,
        amount: f64,
        description: &str,
        payload: &str,
    ) -> Result<CreatedInvoice> {
        let resp: ApiResponse<ApiInvoice> = self
            .http
            .post(format!("{}/createInvoice", self.base))
            .header("Crypto-Pay-API-Token", self.token.as_str())
            .json(&serde_json::json!({
                "asset": self.asset,
                "amount": amount.to_string(),
                "description": description,
                "payload": payload,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let invoice = resp
            .result
            .filter(|_| resp.ok)
            .ok_or_else(|| BotError::payment("provider rejected createInvoice"))?;

        Ok(CreatedInvoice {
            id: invoice.invoice_id,
            pay_url: invoice.pay_url,
        })
    }

    async fn invoice_status(&self, id: u64) -> Result<InvoiceStatus> {
        let resp: ApiResponse<ApiInvoiceList> = self
            .http
            .get(format!("{}/getInvoices", self.base))
            .header("Crypto-Pay-API-Token", self.token.as_str())
            .query(&[("invoice_ids", id.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let items = resp
            .result
            .filter(|_| resp.ok)
            .ok_or_else(|| BotError::payment("provider rejected getInvoices"))?;

        let invoice = items
            .items
            .into_iter()
            .find(|i| i.invoice_id == id)
            .ok_or_else(|| BotError::payment("invoice not found at provider"))?;

        Ok(parse_status(&invoice.status))
    }
}

pub struct Activation {
    pub chat_id: ChatId,
}

/// Applies one polled status to the stored invoice. `paid` is terminal:
/// a later poll of the same invoice is a no-op, which is what makes
/// premium activation idempotent.
pub fn apply_poll(
    depot: &mut Depot,
    invoice_id: u64,
    polled: InvoiceStatus,
    now: DateTime<Utc>,
) -> Option<Activation> {
    use storage::prelude::*;

    let invoice = depot.invoices.get(&invoice_id)?;
    if invoice.status != InvoiceStatus::Active {
        return None;
    }
    let user_id = invoice.user_id;
    let amount = invoice.amount;

    match polled {
        InvoiceStatus::Active => None,
        InvoiceStatus::Expired => {
            depot.invoices.modify(&invoice_id, |i| {
                i.status = InvoiceStatus::Expired;
            });
            None
        }
        InvoiceStatus::Paid => {
            depot.invoices.modify(&invoice_id, |i| {
                i.status = InvoiceStatus::Paid;
                i.paid_at = Some(now);
            });

            if amount < PREMIUM_ACTIVATION_THRESHOLD {
                return None;
            }

            let profile = depot.profiles.get_mut(&user_id)?;
            if profile.premium {
                return None;
            }

            profile.premium = true;
            profile.premium_since = Some(now);
            info!("premium activated for user {}", user_id.0);

            Some(Activation {
                chat_id: profile.chat_id,
            })
        }
    }
}

/// Background loop: every tick, poll each outstanding invoice and apply
/// the result. One bad invoice is logged and skipped, never halts the
/// sweep. The depot lock is taken briefly per item, not across HTTP.
pub fn spawn_poller(
    bot: Bot,
    depot: SharedDepot,
    provider: Arc<dyn PaymentProvider + Send + Sync>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            interval.tick().await;

            let pending: Vec<u64> = {
                let depot = depot.read().await;
                depot
                    .invoices
                    .values()
                    .filter(|i| i.status == InvoiceStatus::Active)
                    .map(|i| i.id)
                    .collect()
            };

            for id in pending {
                let status = match provider.invoice_status(id).await {
                    Ok(status) => status,
                    Err(e) => {
                        error!("poll of invoice {} failed: {}", id, e);
                        continue;
                    }
                };

                let activation = {
                    let mut depot = depot.write().await;
                    apply_poll(&mut depot, id, status, Utc::now())
                };

                if let Some(activation) = activation {
                    let notice = bot
                        .send_message(
                            activation.chat_id,
                            "⭐ Оплата получена, премиум-статус активирован. Спасибо!",
                        )
                        .await;
                    if let Err(e) = notice {
                        error!("premium notice to {} failed: {}", activation.chat_id.0, e);
                    }
                }
            }
        }
    })
}

pub fn new_invoice(
    created: &CreatedInvoice,
    user_id: teloxide::types::UserId,
    amount: f64,
    currency: &str,
    purpose: crate::entries::InvoicePurpose,
    now: DateTime<Utc>,
) -> Invoice {
    Invoice {
        id: created.id,
        user_id,
        amount,
        currency: currency.to_owned(),
        purpose,
        status: InvoiceStatus::Active,
        created_at: now,
        paid_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{InvoicePurpose, Profile};
    use storage::prelude::*;
    use teloxide::types::UserId;

    fn depot_with_invoice(amount: f64) -> (Depot, u64, UserId) {
        let mut depot = Depot::new(1000, 800);
        let user = UserId(42);

        depot
            .profiles
            .insert(user, Profile::new(user, ChatId(42), None, Utc::now()));

        let created = CreatedInvoice {
            id: 777,
            pay_url: "https://pay.example/777".to_owned(),
        };
        depot.invoices.insert(
            777,
            new_invoice(&created, user, amount, "USDT", InvoicePurpose::Premium, Utc::now()),
        );

        (depot, 777, user)
    }

    #[test]
    fn paid_invoice_activates_premium_exactly_once() {
        let (mut depot, id, user) = depot_with_invoice(3.0);

        let first = apply_poll(&mut depot, id, InvoiceStatus::Paid, Utc::now());
        assert!(first.is_some());
        assert!(depot.profiles.get(&user).unwrap().premium);
        assert_eq!(
            depot.invoices.get(&id).unwrap().status,
            InvoiceStatus::Paid
        );

        // the provider still reports "paid" on the next cycle
        let second = apply_poll(&mut depot, id, InvoiceStatus::Paid, Utc::now());
        assert!(second.is_none());
        assert!(depot.profiles.get(&user).unwrap().premium);
    }

    #[test]
    fn small_payment_does_not_grant_premium() {
        let (mut depot, id, user) = depot_with_invoice(1.0);

        let activation = apply_poll(&mut depot, id, InvoiceStatus::Paid, Utc::now());

        assert!(activation.is_none());
        assert!(!depot.profiles.get(&user).unwrap().premium);
        // the invoice itself is still settled
        assert_eq!(depot.invoices.get(&id).unwrap().status, InvoiceStatus::Paid);
    }

    #[test]
    fn expired_is_terminal_too() {
        let (mut depot, id, _) = depot_with_invoice(3.0);

        apply_poll(&mut depot, id, InvoiceStatus::Expired, Utc::now());
        // a stale "paid" after expiry changes nothing
        let after = apply_poll(&mut depot, id, InvoiceStatus::Paid, Utc::now());

        assert!(after.is_none());
        assert_eq!(
            depot.invoices.get(&id).unwrap().status,
            InvoiceStatus::Expired
        );
    }

    #[test]
    fn provider_status_strings_map() {
        assert_eq!(parse_status("paid"), InvoiceStatus::Paid);
        assert_eq!(parse_status("expired"), InvoiceStatus::Expired);
        assert_eq!(parse_status("active"), InvoiceStatus::Active);
        assert_eq!(parse_status("whatever"), InvoiceStatus::Active);
    }
}
