// tests/common/api_listener.rs
//
// イベントバスを購読し、期待したイベントが期待した順に届いたかを検証する

use billing_backend::service::event_bus::{BusEvent, NextEvent, SubscriptionEventBus};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};

pub struct TestApiListener {
    receiver: Mutex<broadcast::Receiver<BusEvent>>,
    expected: Mutex<VecDeque<NextEvent>>,
}

impl TestApiListener {
    pub fn new(bus: &SubscriptionEventBus) -> Self {
        Self {
            receiver: Mutex::new(bus.subscribe()),
            expected: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_expected_event(&self, event: NextEvent) {
        self.expected.lock().unwrap().push_back(event);
    }

    pub fn push_expected_events(&self, events: &[NextEvent]) {
        self.expected.lock().unwrap().extend(events.iter().copied());
    }

    /// これまでに届いたイベント（未検証分）を全て取り出す
    pub fn drain_received(&self) -> Vec<BusEvent> {
        let mut receiver = self.receiver.lock().unwrap();
        let mut received = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => received.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    panic!("listener lagged behind, {} events lost", skipped)
                }
            }
        }
        received
    }

    /// 期待したイベントが全て順番通りに届き、余計なイベントが無いことを確認する
    pub fn assert_listener_status(&self) {
        let received: Vec<NextEvent> = self
            .drain_received()
            .into_iter()
            .map(|event| event.kind)
            .collect();
        let expected: Vec<NextEvent> = self.expected.lock().unwrap().drain(..).collect();

        assert_eq!(
            received, expected,
            "bus events did not match expectations"
        );
    }

    pub fn is_completed(&self) -> bool {
        self.expected.lock().unwrap().is_empty()
    }
}
