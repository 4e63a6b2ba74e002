use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostEventKind {
    OrderStatusChanged,
    OrderCompleted,
    LocaleAdded,
    UserSaved,
    UserLoggedIn,
    UserLoggedOut,
}

impl HostEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrderStatusChanged => "order-status-changed",
            Self::OrderCompleted => "order-completed",
            Self::LocaleAdded => "locale-added",
            Self::UserSaved => "user-saved",
            Self::UserLoggedIn => "user-logged-in",
            Self::UserLoggedOut => "user-logged-out",
        }
    }

    /// Events only raised by web requests; console runs never see them.
    pub fn requires_web_session(self) -> bool {
        matches!(self, Self::UserSaved | Self::UserLoggedIn | Self::UserLoggedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    OrderStatusChanged {
        order_id: u64,
        from_status: Option<String>,
        to_status: String,
    },
    OrderCompleted {
        order_id: u64,
    },
    LocaleAdded {
        locale: String,
    },
    UserSaved {
        user_id: u64,
    },
    UserLoggedIn {
        user_id: u64,
    },
    UserLoggedOut {
        user_id: u64,
    },
}

impl HostEvent {
    pub fn kind(&self) -> HostEventKind {
        match self {
            Self::OrderStatusChanged { .. } => HostEventKind::OrderStatusChanged,
            Self::OrderCompleted { .. } => HostEventKind::OrderCompleted,
            Self::LocaleAdded { .. } => HostEventKind::LocaleAdded,
            Self::UserSaved { .. } => HostEventKind::UserSaved,
            Self::UserLoggedIn { .. } => HostEventKind::UserLoggedIn,
            Self::UserLoggedOut { .. } => HostEventKind::UserLoggedOut,
        }
    }
}

pub type EventHandler<C> = Box<dyn Fn(&HostEvent, &mut C) -> Result<()>>;

struct Subscriber<C> {
    name: String,
    handler: EventHandler<C>,
}

/// Handlers keyed by event kind, fixed once built.
///
/// `C` is whatever state the handlers act on (the working schema for the
/// handlers this workspace ships).
pub struct EventSubscriptions<C> {
    subscribers: BTreeMap<HostEventKind, Vec<Subscriber<C>>>,
}

impl<C> fmt::Debug for EventSubscriptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self
            .subscribers
            .iter()
            .map(|(kind, subscribers)| (kind.as_str(), subscribers.len()))
            .collect::<BTreeMap<_, _>>();
        f.debug_struct("EventSubscriptions")
            .field("subscribers", &summary)
            .finish()
    }
}

impl<C> EventSubscriptions<C> {
    pub fn builder(console: bool) -> EventSubscriptionsBuilder<C> {
        EventSubscriptionsBuilder {
            console,
            subscribers: BTreeMap::new(),
        }
    }

    pub fn subscriber_names(&self, kind: HostEventKind) -> Vec<&str> {
        self.subscribers
            .get(&kind)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .map(|subscriber| subscriber.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Runs every handler for the event in registration order and returns
    /// how many ran. Stops at the first handler error.
    pub fn dispatch(&self, event: &HostEvent, context: &mut C) -> Result<usize> {
        let kind = event.kind();
        let Some(subscribers) = self.subscribers.get(&kind) else {
            debug!(event = kind.as_str(), "no subscribers");
            return Ok(0);
        };

        for subscriber in subscribers {
            debug!(
                event = kind.as_str(),
                handler = subscriber.name.as_str(),
                "dispatching host event"
            );
            (subscriber.handler)(event, context).with_context(|| {
                format!(
                    "handler '{}' failed for event '{}'",
                    subscriber.name,
                    kind.as_str()
                )
            })?;
        }
        Ok(subscribers.len())
    }
}

pub struct EventSubscriptionsBuilder<C> {
    console: bool,
    subscribers: BTreeMap<HostEventKind, Vec<Subscriber<C>>>,
}

impl<C> EventSubscriptionsBuilder<C> {
    pub fn on<F>(mut self, kind: HostEventKind, name: &str, handler: F) -> Self
    where
        F: Fn(&HostEvent, &mut C) -> Result<()> + 'static,
    {
        if self.console && kind.requires_web_session() {
            debug!(
                event = kind.as_str(),
                handler = name,
                "skipping web-session subscription for console run"
            );
            return self;
        }

        self.subscribers.entry(kind).or_default().push(Subscriber {
            name: name.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    pub fn build(self) -> EventSubscriptions<C> {
        EventSubscriptions {
            subscribers: self.subscribers,
        }
    }
}
