//! Local authentication that gates every order.

use futures::future::BoxFuture;

use crate::console::Console;
use crate::prelude::*;

pub const AUTH_REASON: &str = "Only authorized use of the dispenser is allowed.";

/// Outcome of a single verification attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Trusted,
    Rejected,
    /// The capability is missing, or the attempt could not be completed (cancelled, hardware error, etc).
    Unavailable,
}

/// One way of establishing that the operator is trusted, such as a biometric sensor or a passcode.
pub trait Verifier: Send + Sync {
    fn is_available(&self) -> bool;

    fn verify<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Verdict>;
}

/// A single yes/no trust decision. Retrying is up to the caller.
///
/// The decision resolves on the task that awaits it, so whatever the caller does next (clearing input, showing
/// an error) is never concurrent with other work on that task.
pub trait AuthGate: Send + Sync {
    fn authenticate<'a>(&'a self) -> BoxFuture<'a, bool>;
}

/// Biometrics first, falling back to a passcode when biometrics are missing or don't succeed.
pub struct LocalAuthGate {
    biometric: Box<dyn Verifier>,
    passcode: Box<dyn Verifier>,
}

impl LocalAuthGate {
    pub fn new(biometric: Box<dyn Verifier>, passcode: Box<dyn Verifier>) -> Self {
        LocalAuthGate {
            biometric,
            passcode,
        }
    }
}

impl AuthGate for LocalAuthGate {
    fn authenticate<'a>(&'a self) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if self.biometric.is_available() {
                match self.biometric.verify(AUTH_REASON).await {
                    Verdict::Trusted => return true,
                    verdict => trace_packet!("Biometrics returned {:?}, using passcode", verdict),
                }
            }
            if !self.passcode.is_available() {
                warning!("Passcode authentication is unavailable, set DISPENSER_PASSCODE or pass --passcode");
                return false;
            }
            self.passcode.verify(AUTH_REASON).await == Verdict::Trusted
        })
    }
}

/// Terminals have no biometric sensor.
pub struct NoBiometrics;

impl Verifier for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    fn verify<'a>(&'a self, _reason: &'a str) -> BoxFuture<'a, Verdict> {
        Box::pin(async { Verdict::Unavailable })
    }
}

/// Asks for the operator passcode on the console.
pub struct ConsolePasscode {
    console: Console,
    passcode: Option<String>,
}

impl ConsolePasscode {
    pub fn new(console: Console, passcode: Option<String>) -> Self {
        ConsolePasscode { console, passcode }
    }
}

impl Verifier for ConsolePasscode {
    fn is_available(&self) -> bool {
        matches!(&self.passcode, Some(passcode) if !passcode.is_empty())
    }

    fn verify<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Verdict> {
        Box::pin(async move {
            let expected = match &self.passcode {
                Some(passcode) if !passcode.is_empty() => passcode,
                _ => {
                    warning!("No passcode configured, set DISPENSER_PASSCODE or pass --passcode");
                    return Verdict::Unavailable;
                }
            };
            info!("{}", reason);
            match self.console.read_line("Passcode: ").await {
                Some(entered) if entered == *expected => Verdict::Trusted,
                Some(_) => Verdict::Rejected,
                None => Verdict::Unavailable,
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedVerifier {
        available: bool,
        verdict: Verdict,
        calls: Arc<AtomicUsize>,
    }

    impl FixedVerifier {
        fn new(available: bool, verdict: Verdict) -> (Box<dyn Verifier>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let verifier = FixedVerifier {
                available,
                verdict,
                calls: calls.clone(),
            };
            (Box::new(verifier), calls)
        }
    }

    impl Verifier for FixedVerifier {
        fn is_available(&self) -> bool {
            self.available
        }

        fn verify<'a>(&'a self, _reason: &'a str) -> BoxFuture<'a, Verdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { self.verdict })
        }
    }

    #[rstest]
    #[case(true, Verdict::Trusted, Verdict::Rejected, true, 1, 0)]
    #[case(true, Verdict::Rejected, Verdict::Trusted, true, 1, 1)]
    #[case(true, Verdict::Unavailable, Verdict::Trusted, true, 1, 1)]
    #[case(true, Verdict::Rejected, Verdict::Rejected, false, 1, 1)]
    #[case(false, Verdict::Trusted, Verdict::Trusted, true, 0, 1)]
    #[case(false, Verdict::Trusted, Verdict::Rejected, false, 0, 1)]
    #[case(false, Verdict::Trusted, Verdict::Unavailable, false, 0, 1)]
    #[tokio::test]
    async fn fallback(
        #[case] biometric_available: bool,
        #[case] biometric: Verdict,
        #[case] passcode: Verdict,
        #[case] expected: bool,
        #[case] biometric_calls: usize,
        #[case] passcode_calls: usize,
    ) {
        let (biometric, biometric_count) = FixedVerifier::new(biometric_available, biometric);
        let (passcode, passcode_count) = FixedVerifier::new(true, passcode);
        let gate = LocalAuthGate::new(biometric, passcode);
        assert_eq!(expected, gate.authenticate().await);
        assert_eq!(biometric_calls, biometric_count.load(Ordering::SeqCst));
        assert_eq!(passcode_calls, passcode_count.load(Ordering::SeqCst));
    }

    #[rstest]
    #[case(true, Verdict::Rejected)]
    #[case(false, Verdict::Trusted)]
    #[tokio::test]
    async fn unavailable_passcode_is_never_asked(
        #[case] biometric_available: bool,
        #[case] biometric: Verdict,
    ) {
        let (biometric, _) = FixedVerifier::new(biometric_available, biometric);
        let (passcode, passcode_count) = FixedVerifier::new(false, Verdict::Trusted);
        let gate = LocalAuthGate::new(biometric, passcode);
        assert!(!gate.authenticate().await);
        assert_eq!(0, passcode_count.load(Ordering::SeqCst));
    }

    #[rstest]
    #[case(Some("1234"), Some("1234"), Verdict::Trusted)]
    #[case(Some("1234"), Some("4321"), Verdict::Rejected)]
    #[case(Some("1234"), None, Verdict::Unavailable)]
    #[case(None, Some("1234"), Verdict::Unavailable)]
    #[case(Some(""), Some(""), Verdict::Unavailable)]
    #[tokio::test]
    async fn console_passcode(
        #[case] configured: Option<&str>,
        #[case] entered: Option<&str>,
        #[case] expected: Verdict,
    ) {
        let console = Console::from_lines(entered.map(str::to_owned));
        let verifier = ConsolePasscode::new(console, configured.map(str::to_owned));
        assert_eq!(expected, verifier.verify(AUTH_REASON).await);
    }

    #[tokio::test]
    async fn no_biometrics() {
        let gate = LocalAuthGate::new(
            Box::new(NoBiometrics),
            Box::new(ConsolePasscode::new(
                Console::from_lines(["1234".to_owned()]),
                Some("1234".to_owned()),
            )),
        );
        assert!(gate.authenticate().await);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[tokio::test]
    async fn unset_passcode_fails(#[case] configured: Option<&str>) {
        let verifier = ConsolePasscode::new(
            Console::from_lines(["".to_owned()]),
            configured.map(str::to_owned),
        );
        assert!(!verifier.is_available());
        let gate = LocalAuthGate::new(Box::new(NoBiometrics), Box::new(verifier));
        assert!(!gate.authenticate().await);
    }
}
