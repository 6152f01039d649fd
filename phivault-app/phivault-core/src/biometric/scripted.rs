use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BiometricHardware, BiometricKind};
use crate::error::{PhiVaultError, Result};

/// Biometric hardware whose answers are scripted in advance.
///
/// Prompt results are consumed in order; once the queue is empty every
/// prompt is refused.
pub struct ScriptedBiometrics {
    has_hardware: AtomicBool,
    enrolled: AtomicBool,
    failing: AtomicBool,
    kinds: Mutex<Vec<BiometricKind>>,
    prompt_results: Mutex<VecDeque<bool>>,
    prompts_shown: AtomicUsize,
    last_message: Mutex<Option<String>>,
}

impl ScriptedBiometrics {
    /// Hardware present and enrolled with Face.
    pub fn available() -> Self {
        Self {
            has_hardware: AtomicBool::new(true),
            enrolled: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            kinds: Mutex::new(vec![BiometricKind::Face]),
            prompt_results: Mutex::new(VecDeque::new()),
            prompts_shown: AtomicUsize::new(0),
            last_message: Mutex::new(None),
        }
    }

    /// No biometric hardware at all.
    pub fn absent() -> Self {
        let this = Self::available();
        this.has_hardware.store(false, Ordering::SeqCst);
        this.enrolled.store(false, Ordering::SeqCst);
        this.kinds.lock().clear();
        this
    }

    pub fn set_enrolled(&self, enrolled: bool) {
        self.enrolled.store(enrolled, Ordering::SeqCst);
    }

    pub fn set_kinds(&self, kinds: Vec<BiometricKind>) {
        *self.kinds.lock() = kinds;
    }

    /// Make every adapter call return an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn push_prompt_result(&self, passed: bool) {
        self.prompt_results.lock().push_back(passed);
    }

    pub fn prompts_shown(&self) -> usize {
        self.prompts_shown.load(Ordering::SeqCst)
    }

    pub fn last_message(&self) -> Option<String> {
        self.last_message.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PhiVaultError::HardwareUnavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl BiometricHardware for ScriptedBiometrics {
    async fn has_hardware(&self) -> Result<bool> {
        self.check()?;
        Ok(self.has_hardware.load(Ordering::SeqCst))
    }

    async fn is_enrolled(&self) -> Result<bool> {
        self.check()?;
        Ok(self.enrolled.load(Ordering::SeqCst))
    }

    async fn supported_kinds(&self) -> Result<Vec<BiometricKind>> {
        self.check()?;
        Ok(self.kinds.lock().clone())
    }

    async fn prompt(&self, message: &str) -> Result<bool> {
        self.check()?;
        self.prompts_shown.fetch_add(1, Ordering::SeqCst);
        *self.last_message.lock() = Some(message.to_string());
        Ok(self.prompt_results.lock().pop_front().unwrap_or(false))
    }
}
