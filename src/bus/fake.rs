//! A scripted in-memory transport that keeps count of what it hands out.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    ops::Deref,
    rc::Rc,
    time::Duration,
};

use super::{Bus, MatchRule, Transport};
use crate::{
    message::{Message, MessageType},
    Error, Result,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct Scenario {
    /// Answer to the method call. `None` never answers.
    pub reply: Option<Message>,
    /// Queued while the method call is in flight, ahead of the reply.
    pub early: Vec<Message>,
    /// Delivered one per pump, after the call.
    pub signals: Vec<Message>,
    pub open_fails: bool,
    pub add_match_fails: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub opened: Cell<usize>,
    pub closed: Cell<usize>,
    pub delivered: Cell<usize>,
    pub released: Cell<usize>,
    pub sent: RefCell<Vec<Message>>,
    pub matches: RefCell<Vec<MatchRule>>,
}

impl Stats {
    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get() + 1);
    }

    /// Every connection got closed and every message released.
    pub fn balanced(&self) -> bool {
        self.opened.get() == self.closed.get() && self.delivered.get() == self.released.get()
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeBus {
    scenario: Scenario,
    pub stats: Rc<Stats>,
}

impl FakeBus {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            stats: Rc::default(),
        }
    }
}

impl Bus for FakeBus {
    type Connection = FakeConnection;

    fn open(&self) -> Result<FakeConnection> {
        if self.scenario.open_fails {
            return Err(Error::Connection(zbus::Error::Failure(
                "no session bus".to_owned(),
            )));
        }
        Stats::bump(&self.stats.opened);
        Ok(FakeConnection {
            scenario: self.scenario.clone(),
            signals: self.scenario.signals.clone().into(),
            queue: VecDeque::new(),
            stats: Rc::clone(&self.stats),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnection {
    scenario: Scenario,
    signals: VecDeque<Message>,
    queue: VecDeque<Tracked>,
    stats: Rc<Stats>,
}

impl FakeConnection {
    fn deliver(&self, message: Message) -> Tracked {
        Stats::bump(&self.stats.delivered);
        Tracked {
            message,
            stats: Rc::clone(&self.stats),
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        // Queued messages go away with the connection.
        self.queue.clear();
        Stats::bump(&self.stats.closed);
    }
}

impl Transport for FakeConnection {
    type Incoming = Tracked;

    fn call(&mut self, message: &Message, timeout: Duration) -> Result<Option<Tracked>> {
        assert_eq!(message.message_type(), MessageType::MethodCall);
        self.stats.sent.borrow_mut().push(message.clone());
        let serial = self.stats.sent.borrow().len() as u32;

        for early in std::mem::take(&mut self.scenario.early) {
            let early = self.deliver(early);
            self.queue.push_back(early);
        }
        match self.scenario.reply.take() {
            Some(mut reply) => {
                reply.reply_serial = Some(serial);
                Ok(Some(self.deliver(reply)))
            }
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn add_match(&mut self, rule: &MatchRule) -> Result<()> {
        if self.scenario.add_match_fails {
            return Err(Error::Connection(zbus::Error::Failure(
                "org.freedesktop.DBus.Error.AccessDenied".to_owned(),
            )));
        }
        self.stats.matches.borrow_mut().push(rule.clone());
        Ok(())
    }

    fn pump(&mut self, slice: Duration) -> Result<()> {
        match self.signals.pop_front() {
            Some(signal) => {
                let signal = self.deliver(signal);
                self.queue.push_back(signal);
            }
            None => std::thread::sleep(slice),
        }
        Ok(())
    }

    fn pop(&mut self) -> Option<Tracked> {
        self.queue.pop_front()
    }
}

/// A delivered message that reports its release.
#[derive(Debug)]
pub(crate) struct Tracked {
    message: Message,
    stats: Rc<Stats>,
}

impl Deref for Tracked {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        Stats::bump(&self.stats.released);
    }
}
