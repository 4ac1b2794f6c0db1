use std::sync::Arc;

use storage::prelude::*;
use teloxide::types::UserId;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::entries::*;

pub mod prelude {
    pub use super::{Depot, SharedDepot};
    pub use storage::prelude::*;
}

/// All process state lives here, behind one lock. Handlers take it for
/// the duration of their own read-modify-write; the payment poller and
/// the sweeps take it briefly per item and never across an HTTP call.
pub type SharedDepot = Arc<RwLock<Depot>>;

pub struct Depot {
    pub conversations: Keyed<UserId, ConversationState>,
    pub support_sessions: Keyed<UserId, chrono::DateTime<chrono::Utc>>,
    pub profiles: Keyed<UserId, Profile>,
    pub tickets: Keyed<u64, Ticket>,
    pub tickets_by_user: Index<UserId, u64>,
    pub invoices: Keyed<u64, Invoice>,
    pub listings: Vec<PublishedListing>,
    pub messages: BoundedLog<CachedMessage>,
    ticket_seq: u64,
}

impl Depot {
    pub fn new(message_cap: usize, message_trim_to: usize) -> Self {
        Self {
            conversations: Keyed::new(),
            support_sessions: Keyed::new(),
            profiles: Keyed::new(),
            tickets: Keyed::new(),
            tickets_by_user: Index::new(),
            invoices: Keyed::new(),
            listings: Vec::new(),
            messages: BoundedLog::new(message_cap, message_trim_to),
            ticket_seq: 0,
        }
    }

    /// Monotonic source for human-displayable ticket ids.
    pub fn next_ticket_seq(&mut self) -> u64 {
        self.ticket_seq += 1;
        self.ticket_seq
    }

    /// The user's open tickets, newest first.
    pub fn open_tickets_newest_first(&self, user_id: UserId) -> Vec<&Ticket> {
        let mut tickets: Vec<&Ticket> = self
            .tickets_by_user
            .group(&user_id)
            .iter()
            .filter_map(|seq| self.tickets.get(seq))
            .filter(|t| t.status.is_open())
            .collect();

        tickets.sort_by(|a, b| b.seq.cmp(&a.seq));
        tickets
    }

    /// The user's latest published listings, newest first.
    pub fn recent_listings(&self, user_id: UserId) -> impl Iterator<Item = &PublishedListing> {
        self.listings
            .iter()
            .rev()
            .filter(move |l| l.user_id == user_id)
    }
}

pub fn build(config: &Config) -> SharedDepot {
    Arc::new(RwLock::new(Depot::new(
        config.cleanup.message_cache_cap,
        config.cleanup.message_cache_trim_to,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tickets::new_ticket;
    use chrono::Utc;

    #[test]
    fn ticket_seq_is_monotonic() {
        let mut depot = Depot::new(1000, 800);
        let a = depot.next_ticket_seq();
        let b = depot.next_ticket_seq();
        assert!(b > a);
    }

    #[test]
    fn open_tickets_come_newest_first() {
        let mut depot = Depot::new(1000, 800);
        let user = UserId(1);

        for text in ["первый вопрос", "второй вопрос", "третий вопрос"] {
            let seq = depot.next_ticket_seq();
            depot
                .tickets
                .insert(seq, new_ticket(seq, user, text.to_owned(), None, Utc::now()));
            depot.tickets_by_user.insert(user, seq);
        }

        let open = depot.open_tickets_newest_first(user);
        let seqs: Vec<u64> = open.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
    }
}
