mod callbacks;
mod cleanup;
mod commands;
mod common;
mod config;
mod depot;
mod entries;
mod payment;
mod publisher;
mod support;
mod utils;
mod wizard;

use std::fmt::Display;
use std::sync::Arc;
use std::{error::Error as StdError, fs};

use config::Config;
use futures::future::BoxFuture;
use log::debug;
use payment::{CryptoPay, PaymentProvider};
use teloxide::error_handlers::ErrorHandler;

use teloxide::{
    dispatching::{DpHandlerDescription, UpdateHandler},
    prelude::*,
};

mod prelude {
    pub use super::{BotError, HandlerResult, Result};
    pub use crate::common::*;
    pub use crate::depot::prelude::*;
    pub use crate::entries::prelude::*;
}

pub type BoxedError = Box<dyn StdError + Send + Sync>;
pub type Result<T> = std::result::Result<T, BoxedError>;
pub type HandlerResult = Handler<'static, DependencyMap, Result<()>, DpHandlerDescription>;

#[derive(Debug)]
pub enum BotError {
    Unknown(String),
    Wizard(String),
    Payment(String),
}

impl BotError {
    pub fn unknown(s: &str) -> Self {
        Self::Unknown(s.to_owned())
    }

    pub fn wizard(s: &str) -> Self {
        Self::Wizard(s.to_owned())
    }

    pub fn payment(s: &str) -> Self {
        Self::Payment(s.to_owned())
    }
}

impl Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotError::Unknown(s) => write!(f, "invalid request: {}", s),
            BotError::Wizard(s) => write!(f, "wizard error: {}", s),
            BotError::Payment(s) => write!(f, "payment error: {}", s),
        }
    }
}

impl StdError for BotError {}

struct DisplayErrorHandler;

impl<E> ErrorHandler<E> for DisplayErrorHandler
where
    E: Display,
{
    fn handle_error(self: Arc<Self>, error: E) -> BoxFuture<'static, ()> {
        log::error!("An error occurred: {}", error);
        Box::pin(async {})
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let config = read_config();
    let depot = depot::build(&config);
    let bot = Bot::new(config.telegram.bot_token.clone());

    let provider: Arc<dyn PaymentProvider + Send + Sync> =
        Arc::new(CryptoPay::new(&config.payment));

    payment::spawn_poller(
        bot.clone(),
        depot.clone(),
        provider.clone(),
        config.payment.poll_interval_secs,
    );
    cleanup::spawn_sweeps(depot.clone(), config.cleanup.clone());

    let mut deps = DependencyMap::default();
    deps.insert(depot);
    deps.insert(Arc::new(config));
    deps.insert(provider);

    Dispatcher::builder(bot, schema())
        .dependencies(deps)
        .enable_ctrlc_handler()
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(Arc::new(DisplayErrorHandler))
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    dptree::entry()
        .branch(wizard::handler())
        .branch(support::handler())
        .branch(commands::handler())
        .branch(callbacks::handler())
        .endpoint(common::default_handler)
}

fn read_config() -> Config {
    let raw = fs::read_to_string("config.toml").expect("Can't read config");
    let config: Config = toml::from_str(&raw).expect("Can't parse config");

    utils::verify::price(
        &config.payment.premium_price.to_string(),
        &utils::verify::PREMIUM_PRICE,
    )
    .expect("premium_price out of bounds");

    config
}
