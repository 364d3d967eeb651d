//! Platform lifecycle events and HMD notifications
//!
//! Platform callbacks run on arbitrary threads. They only enqueue a tagged
//! event; the game thread drains the queue and acts on it in FIFO order.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};

/// Zero-argument notifications from the platform host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    ApplicationCreated,
    ApplicationPause,
    ApplicationResume,
    BackButtonPressed,
    SettingsMenuOpened,
    ToggleStereoModeButtonPressed,
    SwitchViewerButtonPressed,
    DisplayOrientationChanged,
}

/// Broadcast to game code by the HMD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmdNotification {
    StereoModeChanged(bool),
    SettingsMenuOpened,
    /// Several viewer scans in a row failed to produce usable params
    RescanRequested,
}

/// Cloneable, thread-safe producer side of the lifecycle queue
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<LifecycleEvent>,
}

impl EventSender {
    /// Fire-and-forget; events sent after the queue is gone are dropped.
    pub fn send(&self, event: LifecycleEvent) {
        if self.tx.send(event).is_err() {
            warn!("Dropping {:?}, HMD event queue is closed", event);
        }
    }
}

/// Consumer side, owned by the game thread
pub struct EventQueue {
    tx: Sender<LifecycleEvent>,
    rx: Receiver<LifecycleEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    /// Everything queued so far, oldest first
    pub fn drain(&self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if !events.is_empty() {
            debug!("Draining {} lifecycle events", events.len());
        }
        events
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side of HMD notifications
pub struct NotificationHub {
    subscribers: Vec<Sender<HmdNotification>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<HmdNotification> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Send to every live subscriber, forgetting the ones that hung up.
    pub fn broadcast(&mut self, notification: HmdNotification) {
        debug!("Broadcasting {:?}", notification);
        self.subscribers.retain(|tx| tx.send(notification).is_ok());
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_per_sender() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        sender.send(LifecycleEvent::ApplicationPause);
        sender.send(LifecycleEvent::ApplicationResume);
        sender.send(LifecycleEvent::BackButtonPressed);
        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.drain(),
            vec![
                LifecycleEvent::ApplicationPause,
                LifecycleEvent::ApplicationResume,
                LifecycleEvent::BackButtonPressed
            ]
        );
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_send_from_other_thread() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        thread::spawn(move || {
            for _ in 0..10 {
                sender.send(LifecycleEvent::DisplayOrientationChanged);
            }
        })
        .join()
        .unwrap();
        assert_eq!(queue.drain().len(), 10);
    }

    #[test]
    fn test_send_after_queue_dropped() {
        let queue = EventQueue::new();
        let sender = queue.sender();
        drop(queue);
        sender.send(LifecycleEvent::ApplicationCreated);
    }

    #[test]
    fn test_broadcast_drops_hung_up_listeners() {
        let mut hub = NotificationHub::new();
        let kept = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);

        hub.broadcast(HmdNotification::StereoModeChanged(true));
        assert_eq!(hub.subscribers.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), HmdNotification::StereoModeChanged(true));
    }
}
