//! Periodic maintenance. Each sweep is best-effort: a skipped cycle is
//! invisible to users and the next tick picks the garbage up.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;
use storage::clock::IdleClock;
use storage::prelude::*;

use crate::config::CleanupConfig;
use crate::depot::{Depot, SharedDepot};

const CONVERSATION_SWEEP_SECS: u64 = 60 * 60;
const MESSAGE_CACHE_SWEEP_SECS: u64 = 6 * 60 * 60;
const TICKET_SWEEP_SECS: u64 = 24 * 60 * 60;

pub fn sweep_conversations(
    depot: &mut Depot,
    wizard_clock: IdleClock,
    session_clock: IdleClock,
    now: DateTime<Utc>,
) -> usize {
    let conversations = depot
        .conversations
        .sweep(|state| wizard_clock.expired(state.last_activity, now));
    let sessions = depot
        .support_sessions
        .sweep(|opened| session_clock.expired(*opened, now));

    conversations + sessions
}

/// Removes resolved tickets that have sat unchanged past the retention
/// window, keeping the per-user index in sync.
pub fn sweep_tickets(depot: &mut Depot, retention: IdleClock, now: DateTime<Utc>) -> usize {
    let expired: Vec<_> = depot
        .tickets
        .values()
        .filter(|t| t.status.is_resolved() && retention.expired(t.status_changed, now))
        .map(|t| (t.seq, t.user_id))
        .collect();

    for (seq, user_id) in &expired {
        depot.tickets.remove(seq);
        depot.tickets_by_user.remove(user_id, seq);
    }

    expired.len()
}

pub fn spawn_sweeps(depot: SharedDepot, config: CleanupConfig) -> Vec<tokio::task::JoinHandle<()>> {
    let wizard_clock = IdleClock::hours(config.conversation_ttl_hours);
    let session_clock = IdleClock::hours(config.support_session_ttl_hours);
    let retention = IdleClock::days(config.ticket_retention_days);

    let conversations = {
        let depot = depot.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CONVERSATION_SWEEP_SECS));
            loop {
                interval.tick().await;
                let dropped = {
                    let mut depot = depot.write().await;
                    sweep_conversations(&mut depot, wizard_clock, session_clock, Utc::now())
                };
                if dropped > 0 {
                    info!("swept {} idle conversation(s)", dropped);
                }
            }
        })
    };

    let messages = {
        let depot = depot.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(MESSAGE_CACHE_SWEEP_SECS));
            loop {
                interval.tick().await;
                depot.write().await.messages.trim();
            }
        })
    };

    let tickets = {
        let depot = depot.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(TICKET_SWEEP_SECS));
            loop {
                interval.tick().await;
                let dropped = {
                    let mut depot = depot.write().await;
                    sweep_tickets(&mut depot, retention, Utc::now())
                };
                if dropped > 0 {
                    info!("garbage-collected {} old ticket(s)", dropped);
                }
            }
        })
    };

    vec![conversations, messages, tickets]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{ConversationState, TicketStatus};
    use crate::support::tickets::{new_ticket, update_status};
    use chrono::Duration as ChronoDuration;
    use teloxide::types::UserId;

    #[test]
    fn idle_conversations_are_swept_active_kept() {
        let mut depot = Depot::new(1000, 800);
        let now = Utc::now();

        let mut stale = ConversationState::new(now - ChronoDuration::hours(30));
        stale.last_activity = now - ChronoDuration::hours(30);
        depot.conversations.insert(UserId(1), stale);
        depot.conversations.insert(UserId(2), ConversationState::new(now));

        let dropped =
            sweep_conversations(&mut depot, IdleClock::hours(24), IdleClock::hours(1), now);

        assert_eq!(dropped, 1);
        assert!(depot.conversations.contains(&UserId(2)));
        assert!(!depot.conversations.contains(&UserId(1)));
    }

    #[test]
    fn only_old_resolved_tickets_are_collected() {
        let mut depot = Depot::new(1000, 800);
        let now = Utc::now();
        let user = UserId(7);
        let long_ago = now - ChronoDuration::days(40);

        let mut solved = new_ticket(1, user, "старый решённый".to_owned(), None, long_ago);
        update_status(&mut solved, TicketStatus::Solved, "admin", long_ago);
        depot.tickets.insert(1, solved);
        depot.tickets_by_user.insert(user, 1);

        // open and just as old, but never resolved
        let open = new_ticket(2, user, "старый открытый".to_owned(), None, long_ago);
        depot.tickets.insert(2, open);
        depot.tickets_by_user.insert(user, 2);

        let dropped = sweep_tickets(&mut depot, IdleClock::days(30), now);

        assert_eq!(dropped, 1);
        assert!(!depot.tickets.contains(&1));
        assert!(depot.tickets.contains(&2));
        assert_eq!(depot.tickets_by_user.group(&user), &[2]);
    }
}
