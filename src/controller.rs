//! Reconnection controller
//!
//! Ties probing, login and heartbeat together into one self-healing loop.
//! Each iteration performs exactly one connectivity check and decides what to
//! do from that result and the current state alone.

use crate::config::AgentConfig;
use crate::portal::CaptivePortal;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Disconnected,
    Connected,
}

/// State owned and mutated by the controller only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityState {
    pub connectivity: Connectivity,
    /// Consecutive login attempts since the last success
    pub login_attempts: u32,
    /// Set on the first successful connectivity check, never cleared
    pub first_connected: bool,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            connectivity: Connectivity::Disconnected,
            login_attempts: 0,
            first_connected: false,
        }
    }
}

/// What the loop should do after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Wait(Duration),
    /// Login budget exhausted; the supervisor must rebuild the controller
    Restart,
}

pub struct Controller<P> {
    config: AgentConfig,
    portal: P,
    state: ConnectivityState,
}

impl<P: CaptivePortal> Controller<P> {
    pub fn new(config: AgentConfig, portal: P) -> Self {
        Self {
            config,
            portal,
            state: ConnectivityState::default(),
        }
    }

    /// Run until the login budget is exhausted.
    ///
    /// Returning at all is the restart signal: the caller is expected to
    /// build a fresh controller and go again.
    pub async fn run(&mut self) {
        self.start().await;

        loop {
            match self.step().await {
                Next::Wait(interval) => tokio::time::sleep(interval).await,
                Next::Restart => return,
            }
        }
    }

    /// Initial login, followed by a heartbeat when it succeeds
    pub async fn start(&mut self) {
        if self.portal.login().await.is_some() {
            self.state.login_attempts = 0;
            self.portal.heartbeat().await;
        }
    }

    /// One connectivity check and the action that follows from it
    pub async fn step(&mut self) -> Next {
        tracing::info!("Checking connection...");
        let connected = self.portal.check_connection().await;
        tracing::info!(
            "Connection status: {}",
            if connected { "Connected" } else { "Disconnected" }
        );

        if connected {
            self.on_connected().await
        } else {
            self.on_disconnected().await
        }
    }

    async fn on_connected(&mut self) -> Next {
        let previous = self.state.connectivity;
        self.state.connectivity = Connectivity::Connected;
        self.state.login_attempts = 0;

        if !self.state.first_connected {
            self.state.first_connected = true;
            tracing::info!(
                "Logged in as {}! Your IP: {}",
                self.config.username,
                self.config.ip_address
            );
            tracing::info!("Checking every {} seconds.", self.config.check_interval.as_secs());
        } else {
            if previous == Connectivity::Disconnected {
                tracing::info!("Connection restored via {}", self.portal.name());
            }
            if !self.portal.heartbeat().await {
                tracing::warn!("Heartbeat rejected, logging in again");
                self.portal.login().await;
            }
        }

        Next::Wait(self.config.check_interval)
    }

    async fn on_disconnected(&mut self) -> Next {
        if self.state.connectivity == Connectivity::Connected {
            tracing::warn!("Connection lost");
            self.state.connectivity = Connectivity::Disconnected;
        }

        match self.portal.login().await {
            Some(_) => self.state.login_attempts = 0,
            None => self.state.login_attempts += 1,
        }

        match self.config.max_login_attempts {
            Some(max) if self.state.login_attempts >= max => {
                tracing::warn!(
                    "Max login attempts reached ({}/{}). Restarting...",
                    self.state.login_attempts,
                    max
                );
                Next::Restart
            }
            Some(max) if self.state.login_attempts > 0 => {
                tracing::info!(
                    "Login attempt {}/{} failed, retrying in {} seconds",
                    self.state.login_attempts,
                    max,
                    self.config.retry_interval.as_secs()
                );
                Next::Wait(self.config.retry_interval)
            }
            _ => Next::Wait(self.config.retry_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoginOutcome;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Check,
        Login,
        Heartbeat,
    }

    /// Portal that replays canned results and records every call
    struct ScriptedPortal {
        checks: Mutex<VecDeque<bool>>,
        logins: Mutex<VecDeque<bool>>,
        heartbeats: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedPortal {
        fn new(checks: &[bool], logins: &[bool], heartbeats: &[bool]) -> Self {
            Self {
                checks: Mutex::new(checks.iter().copied().collect()),
                logins: Mutex::new(logins.iter().copied().collect()),
                heartbeats: Mutex::new(heartbeats.iter().copied().collect()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, call: Call) -> usize {
            self.calls().iter().filter(|c| **c == call).count()
        }
    }

    #[async_trait]
    impl CaptivePortal for ScriptedPortal {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn check_connection(&self) -> bool {
            self.calls.lock().unwrap().push(Call::Check);
            self.checks
                .lock()
                .unwrap()
                .pop_front()
                .expect("check script exhausted")
        }

        async fn login(&self) -> Option<LoginOutcome> {
            self.calls.lock().unwrap().push(Call::Login);
            let ok = self.logins.lock().unwrap().pop_front().unwrap_or(false);
            ok.then(|| LoginOutcome::from_body(r#"{"success":true,"token":"t"}"#))
        }

        async fn heartbeat(&self) -> bool {
            self.calls.lock().unwrap().push(Call::Heartbeat);
            self.heartbeats.lock().unwrap().pop_front().unwrap_or(true)
        }
    }

    fn config(max_login_attempts: Option<u32>) -> AgentConfig {
        AgentConfig {
            username: "65010001".to_string(),
            password: "secret".to_string(),
            ip_address: "10.35.1.20".to_string(),
            check_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(10),
            max_login_attempts,
            fallback_acip: "10.252.155.2".to_string(),
            fallback_umac: "a1b2c3d4e5f6".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_connection() {
        let portal = ScriptedPortal::new(&[true], &[true], &[true]);
        let mut controller = Controller::new(config(None), portal);

        controller.start().await;
        let next = controller.step().await;

        assert_eq!(next, Next::Wait(Duration::from_secs(300)));
        assert_eq!(
            controller.portal.calls(),
            vec![Call::Login, Call::Heartbeat, Call::Check]
        );
        assert_eq!(controller.state.connectivity, Connectivity::Connected);
        assert!(controller.state.first_connected);
    }

    #[tokio::test]
    async fn test_failed_start_skips_heartbeat() {
        let portal = ScriptedPortal::new(&[], &[false], &[]);
        let mut controller = Controller::new(config(None), portal);

        controller.start().await;

        assert_eq!(controller.portal.calls(), vec![Call::Login]);
        assert_eq!(controller.state, ConnectivityState::default());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_restarts() {
        let portal = ScriptedPortal::new(&[false, false, true, true, false], &[], &[]);
        let mut controller = Controller::new(config(Some(2)), portal);

        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(10)));
        assert_eq!(controller.state.login_attempts, 1);
        assert_eq!(controller.step().await, Next::Restart);
        assert_eq!(controller.state.login_attempts, 2);

        assert_eq!(
            controller.portal.calls(),
            vec![Call::Check, Call::Login, Call::Check, Call::Login]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_on_budget() {
        let portal = ScriptedPortal::new(&[false, false, true, true, false], &[], &[]);
        let mut controller = Controller::new(config(Some(2)), portal);

        controller.run().await;

        assert_eq!(controller.portal.count(Call::Check), 2);
        assert_eq!(controller.portal.count(Call::Login), 3);
        assert_eq!(controller.portal.count(Call::Heartbeat), 0);
    }

    #[tokio::test]
    async fn test_unlimited_budget_keeps_trying() {
        let portal = ScriptedPortal::new(&[false; 20], &[], &[]);
        let mut controller = Controller::new(config(None), portal);

        for _ in 0..20 {
            assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(10)));
        }
        assert_eq!(controller.state.login_attempts, 20);
    }

    #[tokio::test]
    async fn test_successful_login_resets_attempts() {
        let portal = ScriptedPortal::new(&[false, false, false], &[false, true, false], &[]);
        let mut controller = Controller::new(config(Some(2)), portal);

        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(10)));
        assert_eq!(controller.state.login_attempts, 1);
        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(10)));
        assert_eq!(controller.state.login_attempts, 0);
        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(10)));
        assert_eq!(controller.state.login_attempts, 1);
    }

    #[tokio::test]
    async fn test_connected_check_resets_attempts() {
        let portal = ScriptedPortal::new(&[false, true], &[], &[]);
        let mut controller = Controller::new(config(Some(3)), portal);

        controller.step().await;
        assert_eq!(controller.state.login_attempts, 1);
        controller.step().await;
        assert_eq!(controller.state.login_attempts, 0);
        assert_eq!(controller.state.connectivity, Connectivity::Connected);
    }

    #[tokio::test]
    async fn test_heartbeat_while_connected() {
        let portal = ScriptedPortal::new(&[true, true], &[], &[true]);
        let mut controller = Controller::new(config(None), portal);

        controller.step().await;
        let next = controller.step().await;

        assert_eq!(next, Next::Wait(Duration::from_secs(300)));
        assert_eq!(
            controller.portal.calls(),
            vec![Call::Check, Call::Check, Call::Heartbeat]
        );
    }

    #[tokio::test]
    async fn test_heartbeat_failure_triggers_login() {
        let portal = ScriptedPortal::new(&[true, true], &[true], &[false]);
        let mut controller = Controller::new(config(None), portal);

        controller.step().await;
        let next = controller.step().await;

        assert_eq!(next, Next::Wait(Duration::from_secs(300)));
        assert_eq!(
            controller.portal.calls(),
            vec![Call::Check, Call::Check, Call::Heartbeat, Call::Login]
        );
        assert_eq!(controller.state.connectivity, Connectivity::Connected);
    }

    #[tokio::test]
    async fn test_connection_lost_then_restored() {
        let portal = ScriptedPortal::new(&[true, false, true, true], &[true], &[]);
        let mut controller = Controller::new(config(Some(1)), portal);

        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(300)));

        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(10)));
        assert_eq!(controller.state.connectivity, Connectivity::Disconnected);
        assert!(controller.state.first_connected);

        assert_eq!(controller.step().await, Next::Wait(Duration::from_secs(300)));
        assert_eq!(controller.state.connectivity, Connectivity::Connected);

        controller.step().await;
        assert_eq!(
            controller.portal.calls(),
            vec![
                Call::Check,
                Call::Check,
                Call::Login,
                Call::Check,
                Call::Heartbeat,
                Call::Check,
                Call::Heartbeat,
            ]
        );
    }

    #[tokio::test]
    async fn test_reconnect_sends_heartbeat() {
        let portal = ScriptedPortal::new(&[true, false, true], &[true], &[true]);
        let mut controller = Controller::new(config(None), portal);

        controller.step().await;
        controller.step().await;
        let next = controller.step().await;

        assert_eq!(next, Next::Wait(Duration::from_secs(300)));
        assert_eq!(
            controller.portal.calls(),
            vec![Call::Check, Call::Check, Call::Login, Call::Check, Call::Heartbeat]
        );
    }

    #[tokio::test]
    async fn test_reconnect_heartbeat_failure_logs_in() {
        let portal = ScriptedPortal::new(&[true, false, true], &[true, true], &[false]);
        let mut controller = Controller::new(config(None), portal);

        controller.step().await;
        controller.step().await;
        controller.step().await;

        assert_eq!(
            controller.portal.calls(),
            vec![
                Call::Check,
                Call::Check,
                Call::Login,
                Call::Check,
                Call::Heartbeat,
                Call::Login,
            ]
        );
        assert_eq!(controller.state.connectivity, Connectivity::Connected);
    }
}
