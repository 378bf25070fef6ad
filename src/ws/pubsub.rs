//! Topic subscriptions with optional property filters.
//!
//! A client subscribes to `temp`, optionally narrowed to events carrying
//! `room=lab`. An event matches when the topics are equal and every filter
//! of the subscription is present with the same value on the event.

use heapless::{String, Vec};

use crate::json;

pub const MAX_SUBS: usize = 4;
pub const MAX_PROPS: usize = 2;
pub const TOPIC_LEN: usize = 32;
pub const KEY_LEN: usize = 12;
pub const VALUE_LEN: usize = 32;

/// A key/value pair attached to an emitted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Property<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

impl<'a> Property<'a> {
    pub const fn new(key: &'a str, value: &'a str) -> Self {
        Self { key, value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    topic: String<TOPIC_LEN>,
    filters: Vec<(String<KEY_LEN>, String<VALUE_LEN>), MAX_PROPS>,
}

impl Subscription {
    /// `None` if the topic is empty or too long.
    pub fn new(topic: &str) -> Option<Self> {
        if topic.is_empty() {
            return None;
        }
        let mut t = String::new();
        t.push_str(topic).ok()?;
        Some(Self {
            topic: t,
            filters: Vec::new(),
        })
    }

    /// Add a filter; false if the table is full or the pair too long.
    pub fn with_filter(&mut self, key: &str, value: &str) -> bool {
        let mut k = String::new();
        let mut v = String::new();
        if k.push_str(key).is_err() || v.push_str(value).is_err() {
            return false;
        }
        self.filters.push((k, v)).is_ok()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn filters(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.filters.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn matches(&self, topic: &str, props: &[Property<'_>]) -> bool {
        self.topic.as_str() == topic
            && self.filters.iter().all(|(k, v)| {
                props
                    .iter()
                    .any(|p| p.key == k.as_str() && p.value == v.as_str())
            })
    }
}

#[derive(Default)]
pub struct Subscriptions {
    subs: Vec<Subscription, MAX_SUBS>,
}

impl Subscriptions {
    pub const fn new() -> Self {
        Self { subs: Vec::new() }
    }

    /// False when every slot is taken. Re-subscribing is a no-op.
    pub fn add(&mut self, sub: Subscription) -> bool {
        if self.subs.contains(&sub) {
            return true;
        }
        self.subs.push(sub).is_ok()
    }

    /// Drop every subscription to `topic`; returns how many went.
    pub fn remove(&mut self, topic: &str) -> usize {
        let before = self.subs.len();
        self.subs.retain(|s| s.topic() != topic);
        before - self.subs.len()
    }

    pub fn matches(&self, topic: &str, props: &[Property<'_>]) -> bool {
        self.subs.iter().any(|s| s.matches(topic, props))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subs.iter()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    pub fn clear(&mut self) {
        self.subs.clear();
    }
}

/// A subscription command recognised in a text message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Subscribed,
    Unsubscribed,
    Rejected,
}

/// Apply `{"action":"sub"|"unsub","topic":..,"props":{..}}` if `msg` is one.
pub fn apply_command(subs: &mut Subscriptions, msg: &str) -> Option<Command> {
    let action = json::get_str(msg, "action")?;
    let topic = json::get_str(msg, "topic")?;
    match action {
        "sub" => {
            let Some(mut sub) = Subscription::new(topic) else {
                log::warn!("ws: bad topic '{}'", topic);
                return Some(Command::Rejected);
            };
            if let Some(props) = json::get_object(msg, "props") {
                for (k, v) in json::pairs(props) {
                    if !sub.with_filter(k, v) {
                        log::warn!("ws: filter {}={} on '{}' ignored", k, v, topic);
                    }
                }
            }
            if subs.add(sub) {
                log::debug!("ws: subscribed to '{}'", topic);
                Some(Command::Subscribed)
            } else {
                log::warn!("ws: no free subscription slot for '{}'", topic);
                Some(Command::Rejected)
            }
        }
        "unsub" => {
            subs.remove(topic);
            Some(Command::Unsubscribed)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_topic_matches_only_itself() {
        let mut subs = Subscriptions::new();
        assert!(subs.add(Subscription::new("temp").unwrap()));
        assert!(subs.matches("temp", &[]));
        assert!(subs.matches("temp", &[Property::new("room", "lab")]));
        assert!(!subs.matches("humidity", &[]));
    }

    #[test]
    fn filters_must_all_be_present() {
        let mut sub = Subscription::new("temp").unwrap();
        assert!(sub.with_filter("room", "lab"));
        assert!(sub.with_filter("unit", "C"));
        assert!(!sub.with_filter("extra", "x"));

        let lab_c = [Property::new("unit", "C"), Property::new("room", "lab")];
        let lab_f = [Property::new("room", "lab"), Property::new("unit", "F")];
        assert!(sub.matches("temp", &lab_c));
        assert!(!sub.matches("temp", &lab_f));
        assert!(!sub.matches("temp", &lab_c[1..]));
    }

    #[test]
    fn commands() {
        let mut subs = Subscriptions::new();
        assert_eq!(
            apply_command(&mut subs, r#"{"action":"sub","topic":"temp","props":{"room":"lab"}}"#),
            Some(Command::Subscribed)
        );
        assert_eq!(
            apply_command(&mut subs, r#"{"action":"sub","topic":"temp","props":{"room":"lab"}}"#),
            Some(Command::Subscribed)
        );
        assert_eq!(subs.len(), 1);
        assert!(subs.matches("temp", &[Property::new("room", "lab")]));
        assert!(!subs.matches("temp", &[]));

        assert_eq!(apply_command(&mut subs, r#"{"hello":"world"}"#), None);
        assert_eq!(apply_command(&mut subs, r#"{"action":"unsub","topic":"temp"}"#), Some(Command::Unsubscribed));
        assert!(subs.is_empty());
    }

    #[test]
    fn slots_run_out() {
        let mut subs = Subscriptions::new();
        for t in ["a", "b", "c", "d"] {
            assert!(subs.add(Subscription::new(t).unwrap()));
        }
        assert_eq!(
            apply_command(&mut subs, r#"{"action":"sub","topic":"e"}"#),
            Some(Command::Rejected)
        );
        assert!(Subscription::new("").is_none());
        assert!(Subscription::new(&"x".repeat(40)).is_none());
    }
}
