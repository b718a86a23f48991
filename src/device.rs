//! Device capability trait and the simulated axis used for development and tests.
//!
//! The engine never talks to hardware directly; every motion or readback goes
//! through [`Device`]. Value-change notifications use a Tokio broadcast
//! channel: `subscribe` hands out a receiver, and unsubscribing is dropping
//! the receiver (or aborting the task that consumes it).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Capability interface for one physical axis or I/O point.
#[async_trait]
pub trait Device: Send + Sync {
    fn name(&self) -> String;

    fn connected(&self) -> bool;

    /// Current value of the device's primary signal.
    async fn read(&self) -> Result<f64>;

    /// Move to `position`, interpreted relative to the current position when
    /// `relative` is true.
    async fn move_to(&self, position: f64, relative: bool) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn set_velocity(&self, velocity: f64) -> Result<()>;

    /// Redefine the current position without moving (Galil `DP`).
    async fn set_current_position(&self, position: f64) -> Result<()>;

    async fn home(&self) -> Result<()>;

    /// Subscribe to value-change notifications. Every committed position
    /// change is broadcast; dropping the receiver detaches the subscription.
    fn subscribe(&self) -> broadcast::Receiver<f64>;
}

fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct AxisState {
    position: f64,
    velocity: f64,
    connected: bool,
}

/// A simulated axis with instantaneous moves.
///
/// Moves complete immediately and every position change is broadcast to
/// subscribers, which makes fault-watch and condition-wait behavior easy to
/// exercise without hardware.
pub struct MockAxis {
    name: String,
    state: Mutex<AxisState>,
    sender: broadcast::Sender<f64>,
}

impl MockAxis {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            name: name.into(),
            state: Mutex::new(AxisState {
                position: 0.0,
                velocity: 0.0,
                connected: true,
            }),
            sender,
        }
    }

    /// Current simulated position, for assertions in tests.
    pub fn position(&self) -> f64 {
        lock_state(&self.state).position
    }

    /// Overwrite the readback value and notify subscribers, as if the signal
    /// changed externally.
    pub fn inject(&self, value: f64) {
        lock_state(&self.state).position = value;
        // Ignore errors if no receivers are active
        let _ = self.sender.send(value);
    }

    pub fn set_connected(&self, connected: bool) {
        lock_state(&self.state).connected = connected;
    }

    fn ensure_connected(&self) -> Result<()> {
        if lock_state(&self.state).connected {
            Ok(())
        } else {
            Err(anyhow!("axis '{}' is not connected", self.name))
        }
    }
}

#[async_trait]
impl Device for MockAxis {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn connected(&self) -> bool {
        lock_state(&self.state).connected
    }

    async fn read(&self) -> Result<f64> {
        self.ensure_connected()?;
        Ok(lock_state(&self.state).position)
    }

    async fn move_to(&self, position: f64, relative: bool) -> Result<()> {
        self.ensure_connected()?;
        let value = {
            let mut state = lock_state(&self.state);
            state.position = if relative {
                state.position + position
            } else {
                position
            };
            state.position
        };
        let _ = self.sender.send(value);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.ensure_connected()
    }

    async fn set_velocity(&self, velocity: f64) -> Result<()> {
        self.ensure_connected()?;
        lock_state(&self.state).velocity = velocity;
        Ok(())
    }

    async fn set_current_position(&self, position: f64) -> Result<()> {
        self.ensure_connected()?;
        lock_state(&self.state).position = position;
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        self.move_to(0.0, false).await
    }

    fn subscribe(&self) -> broadcast::Receiver<f64> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absolute_and_relative_moves() {
        let axis = MockAxis::new("galil");
        axis.move_to(5.0, false).await.unwrap();
        axis.move_to(2.5, true).await.unwrap();
        assert_eq!(axis.read().await.unwrap(), 7.5);
    }

    #[tokio::test]
    async fn test_disconnected_axis_fails_reads() {
        let axis = MockAxis::new("galil");
        axis.set_connected(false);
        assert!(axis.read().await.is_err());
        assert!(axis.move_to(1.0, false).await.is_err());
    }

    #[tokio::test]
    async fn test_moves_notify_subscribers() {
        let axis = MockAxis::new("galil");
        let mut rx = axis.subscribe();
        axis.move_to(3.0, false).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), 3.0);
        axis.inject(9.0);
        assert_eq!(rx.recv().await.unwrap(), 9.0);
    }

    #[tokio::test]
    async fn test_home_returns_to_zero() {
        let axis = MockAxis::new("galil");
        axis.move_to(42.0, false).await.unwrap();
        axis.home().await.unwrap();
        assert_eq!(axis.position(), 0.0);
    }
}
