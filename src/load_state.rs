/**
 * Per-asset load/error/retry state machine.
 *
 * One `LoadMachine` is owned by each mounted component instance. It is a plain
 * struct on purpose: the components wire it into signals and timers, while the
 * transition rules stay testable without a DOM.
 */

/// Where a single asset is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    /// Not yet requested. The primary element is unmounted.
    Idle,
    /// The element is mounted and the platform is fetching.
    Requested,
    Loaded,
    /// Terminal for the current key once retries are exhausted.
    Errored,
}

/// What a component should do after reporting a fetch failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorAction {
    /// Arm a single-shot timer; call [`LoadMachine::retry`] when it fires.
    ScheduleRetry,
    /// Retries exhausted. Render the fallback slot and notify the caller.
    Terminal,
}

/// One concrete request for the primary element. `key` is the source identity
/// the machine tracks; `url` (and `src_set`, for the picture variant) is what
/// the element actually fetches, which may carry a cache-busting retry token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRequest {
    pub key: String,
    pub url: String,
    pub src_set: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoadMachine {
    phase: LoadPhase,
    key: String,
    retry_count: u32,
    max_retries: u32,
}

impl LoadMachine {
    pub fn new(key: impl Into<String>, max_retries: u32) -> Self {
        Self {
            phase: LoadPhase::Idle,
            key: key.into(),
            retry_count: 0,
            max_retries,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Begin fetching. Only meaningful from `Idle`; the components call this
    /// when the visibility gate opens (or immediately for priority loads).
    pub fn request(&mut self) {
        if self.phase == LoadPhase::Idle {
            self.phase = LoadPhase::Requested;
        }
    }

    /// Success callback from the platform. Returns `true` only when the
    /// completion is accepted: the key must match the current source identity
    /// (a stale callback from a previous source is discarded) and the machine
    /// must still be in `Requested` (so `on_load` fires exactly once).
    pub fn complete(&mut self, key: &str) -> bool {
        if key != self.key || self.phase != LoadPhase::Requested {
            return false;
        }
        self.phase = LoadPhase::Loaded;
        self.retry_count = 0;
        true
    }

    /// Failure callback from the platform. Stale keys are discarded (`None`).
    pub fn fail(&mut self, key: &str) -> Option<ErrorAction> {
        if key != self.key || self.phase != LoadPhase::Requested {
            return None;
        }
        if self.retry_count < self.max_retries {
            Some(ErrorAction::ScheduleRetry)
        } else {
            self.phase = LoadPhase::Errored;
            Some(ErrorAction::Terminal)
        }
    }

    /// Retry timer fired: count the attempt and re-enter `Requested`. The new
    /// attempt number is returned so the caller can build the cache-busted URL.
    pub fn retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.phase = LoadPhase::Requested;
        self.retry_count
    }

    /// Source identity changed mid-flight: drop everything recorded for the
    /// old key. Returns `true` if the key actually changed.
    pub fn rekey(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if key == self.key {
            return false;
        }
        self.key = key;
        self.phase = LoadPhase::Idle;
        self.retry_count = 0;
        true
    }
}

/// Append a cache-defeating token for retry attempt `n`, preserving any
/// existing query string. Attempt 0 is the unmodified source.
pub fn with_retry_token(src: &str, attempt: u32) -> String {
    if attempt == 0 {
        src.to_string()
    } else if src.contains('?') {
        format!("{src}&_retry={attempt}")
    } else {
        format!("{src}?_retry={attempt}")
    }
}

/// Apply the retry token to every URL in a srcset. The browser picks its own
/// candidate, so busting only the fallback `src` would leave a srcset-selected
/// candidate cached; each candidate URL gets the token, descriptors untouched.
pub fn with_retry_token_srcset(src_set: &str, attempt: u32) -> String {
    if attempt == 0 {
        return src_set.to_string();
    }
    src_set
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            match candidate.split_once(char::is_whitespace) {
                Some((url, descriptor)) => format!(
                    "{} {}",
                    with_retry_token(url, attempt),
                    descriptor.trim_start()
                ),
                None => with_retry_token(candidate, attempt),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load identity for the picture variant, spanning all three fields that can
/// change which candidate the browser fetches.
pub fn composite_key(src: &str, src_set: Option<&str>, sizes: Option<&str>) -> String {
    format!(
        "{}\u{1f}{}\u{1f}{}",
        src,
        src_set.unwrap_or(""),
        sizes.unwrap_or("")
    )
}

#[test]
fn test_first_failure_is_terminal_without_retries() {
    let mut machine = LoadMachine::new("test.jpg", 0);
    machine.request();
    assert_eq!(machine.fail("test.jpg"), Some(ErrorAction::Terminal));
    assert_eq!(machine.phase(), LoadPhase::Errored);
}

#[test]
fn test_absorbs_exactly_n_transient_failures() {
    let mut machine = LoadMachine::new("test.jpg", 2);
    machine.request();

    assert_eq!(machine.fail("test.jpg"), Some(ErrorAction::ScheduleRetry));
    assert_eq!(machine.retry(), 1);
    assert_eq!(machine.fail("test.jpg"), Some(ErrorAction::ScheduleRetry));
    assert_eq!(machine.retry(), 2);

    // Third failure exhausts the budget.
    assert_eq!(machine.fail("test.jpg"), Some(ErrorAction::Terminal));
    assert_eq!(machine.phase(), LoadPhase::Errored);
}

#[test]
fn test_success_resets_retry_counter() {
    let mut machine = LoadMachine::new("test.jpg", 3);
    machine.request();
    assert_eq!(machine.fail("test.jpg"), Some(ErrorAction::ScheduleRetry));
    machine.retry();
    assert!(machine.complete("test.jpg"));
    assert_eq!(machine.phase(), LoadPhase::Loaded);
    assert_eq!(machine.retry_count(), 0);
}

#[test]
fn test_completion_accepted_once() {
    let mut machine = LoadMachine::new("test.jpg", 0);
    machine.request();
    assert!(machine.complete("test.jpg"));
    assert!(!machine.complete("test.jpg"));
}

#[test]
fn test_stale_callbacks_discarded() {
    let mut machine = LoadMachine::new("b.jpg", 1);
    machine.request();
    assert!(!machine.complete("a.jpg"));
    assert_eq!(machine.fail("a.jpg"), None);
    assert_eq!(machine.phase(), LoadPhase::Requested);
}

#[test]
fn test_rekey_resets_everything() {
    let mut machine = LoadMachine::new("a.jpg", 2);
    machine.request();
    assert_eq!(machine.fail("a.jpg"), Some(ErrorAction::ScheduleRetry));
    machine.retry();

    assert!(machine.rekey("b.jpg"));
    assert_eq!(machine.phase(), LoadPhase::Idle);
    assert_eq!(machine.retry_count(), 0);

    // Same key is a no-op.
    assert!(!machine.rekey("b.jpg"));
}

#[test]
fn test_retry_token_uses_existing_query_separator() {
    assert_eq!(with_retry_token("a.jpg", 0), "a.jpg");
    assert_eq!(with_retry_token("a.jpg", 1), "a.jpg?_retry=1");
    assert_eq!(with_retry_token("a.jpg?w=100", 2), "a.jpg?w=100&_retry=2");
}

#[test]
fn test_retry_token_applies_to_each_srcset_candidate() {
    assert_eq!(
        with_retry_token_srcset("a.jpg 480w, b.jpg?x=1 800w", 1),
        "a.jpg?_retry=1 480w, b.jpg?x=1&_retry=1 800w"
    );
    assert_eq!(with_retry_token_srcset("a.jpg 1x", 0), "a.jpg 1x");
    // A bare candidate with no descriptor is legal srcset.
    assert_eq!(with_retry_token_srcset("a.jpg", 2), "a.jpg?_retry=2");
}

#[test]
fn test_composite_key_distinguishes_each_field() {
    let base = composite_key("a.jpg", Some("a 1x"), Some("100vw"));
    assert_ne!(base, composite_key("b.jpg", Some("a 1x"), Some("100vw")));
    assert_ne!(base, composite_key("a.jpg", Some("b 1x"), Some("100vw")));
    assert_ne!(base, composite_key("a.jpg", Some("a 1x"), Some("50vw")));
    assert_eq!(base, composite_key("a.jpg", Some("a 1x"), Some("100vw")));
}
