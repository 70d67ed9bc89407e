use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::idle::WakeEvent;
use crate::settings::{parse_settings_toml, RecognizerSettings, DEFAULT_SETTINGS_TOML};

const LONG: Duration = Duration::from_secs(10);

fn settings() -> RecognizerSettings {
    parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap().recognizer
}

/// Resolver that blocks until its gate opens and records every call.
struct GatedResolver {
    open: Mutex<bool>,
    gate: Condvar,
    started: Mutex<Vec<String>>,
    started_cond: Condvar,
    answer: Recognition,
}

impl GatedResolver {
    fn new(open: bool, answer: Recognition) -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(open),
            gate: Condvar::new(),
            started: Mutex::new(Vec::new()),
            started_cond: Condvar::new(),
            answer,
        })
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.gate.notify_all();
    }

    fn wait_started(&self, n: usize) {
        let guard = self.started.lock().unwrap();
        let (guard, _) = self
            .started_cond
            .wait_timeout_while(guard, LONG, |s| s.len() < n)
            .unwrap();
        assert!(guard.len() >= n, "resolver never started {n} words");
    }

    fn calls(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl CommandResolver for GatedResolver {
    fn resolve(&self, word: &str) -> Recognition {
        self.started.lock().unwrap().push(word.to_string());
        self.started_cond.notify_all();
        let guard = self.open.lock().unwrap();
        let _open = self.gate.wait_while(guard, |open| !*open).unwrap();
        self.answer
    }
}

#[test]
fn resolves_in_background() {
    let resolver = GatedResolver::new(true, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    assert_eq!(rec.find("git"), None);
    assert!(rec.enqueue("git", "git"));
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.find("git"), Some(Recognition::Recognized));
    assert_eq!(resolver.calls(), vec!["git"]);
}

#[test]
fn pending_entry_visible_while_in_flight() {
    let resolver = GatedResolver::new(false, Recognition::NotRecognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    assert!(rec.enqueue("nope", "nope"));
    resolver.wait_started(1);
    assert_eq!(rec.find("nope"), Some(Recognition::Unknown));
    resolver.open();
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.find("nope"), Some(Recognition::NotRecognized));
}

#[test]
fn last_request_wins_single_slot() {
    let resolver = GatedResolver::new(false, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());

    // Occupy the worker so the next two requests share the slot.
    assert!(rec.enqueue("w0", "w0"));
    resolver.wait_started(1);
    assert!(rec.enqueue("w1", "w1"));
    assert!(rec.enqueue("w2", "w2"));
    assert_eq!(rec.find("w1"), Some(Recognition::Unknown));

    resolver.open();
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(resolver.calls(), vec!["w0", "w2"]);
    assert_eq!(rec.find("w1"), None);
    assert_eq!(rec.find("w2"), Some(Recognition::Recognized));
}

#[test]
fn recognize_wait_requeues_displaced_words() {
    let resolver = GatedResolver::new(false, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    let words = ["w0", "w1", "w2", "w3"];

    assert_eq!(rec.recognize("w0"), Recognition::Unknown);
    resolver.wait_started(1);
    for w in &words[1..] {
        assert_eq!(rec.recognize(w), Recognition::Unknown);
    }
    resolver.open();

    for w in words {
        assert_eq!(rec.recognize_wait(w, LONG), Recognition::Recognized, "{w}");
    }
    let mut calls = resolver.calls();
    calls.sort();
    calls.dedup();
    assert_eq!(calls, words);
}

#[test]
fn recognize_wait_gives_up_at_deadline() {
    let resolver = GatedResolver::new(false, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    let started = Instant::now();
    assert_eq!(
        rec.recognize_wait("slow", Duration::from_millis(100)),
        Recognition::Unknown
    );
    assert!(started.elapsed() < LONG);
    assert_eq!(rec.recognize_wait("  ", LONG), Recognition::NotRecognized);
    resolver.open();
}

#[test]
fn confirmed_classification_is_stable() {
    let resolver = GatedResolver::new(true, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    assert!(rec.enqueue("ls", "ls"));
    assert!(rec.wait_until_idle(LONG));
    for _ in 0..5 {
        assert!(rec.enqueue("ls", "ls"));
        assert_eq!(rec.find("ls"), Some(Recognition::Recognized));
    }
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.find("ls"), Some(Recognition::Recognized));
    assert_eq!(resolver.calls().len(), 1);
}

#[test]
fn clear_during_resolution() {
    let resolver = GatedResolver::new(false, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    assert!(rec.enqueue("a", "a"));
    resolver.wait_started(1);

    rec.clear();
    assert_eq!(rec.find("a"), None);

    resolver.open();
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.find("a"), None);

    // Usable again after the clear.
    assert!(rec.enqueue("b", "b"));
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.find("b"), Some(Recognition::Recognized));
}

#[test]
fn clear_drops_confirmed_entries() {
    let resolver = GatedResolver::new(true, Recognition::NotRecognized);
    let rec = Recognizer::new(resolver, &settings());
    for word in ["x", "y", "z"] {
        assert!(rec.enqueue(word, word));
        assert!(rec.wait_until_idle(LONG));
    }
    rec.clear();
    for word in ["x", "y", "z"] {
        assert_eq!(rec.find(word), None);
    }
}

#[test]
fn shutdown_is_terminal() {
    let resolver = GatedResolver::new(true, Recognition::Recognized);
    let rec = Recognizer::new(resolver, &settings());
    assert!(rec.enqueue("git", "git"));
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.find("git"), Some(Recognition::Recognized));

    rec.shutdown();
    assert!(rec.is_zombie());
    assert_eq!(rec.shared_refs(), 1, "worker thread still holds shared state");
    assert!(!rec.enqueue("cargo", "cargo"));
    assert_eq!(rec.find("git"), None);
    assert_eq!(rec.recognize("git"), Recognition::Unknown);
    rec.shutdown();
}

#[test]
fn shutdown_without_worker() {
    let rec = Recognizer::new(GatedResolver::new(true, Recognition::Recognized), &settings());
    rec.shutdown();
    assert!(!rec.enqueue("a", "a"));
}

#[test]
fn bounded_wait_gives_up() {
    let resolver = GatedResolver::new(false, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &settings());
    assert!(rec.enqueue("slow", "slow"));
    resolver.wait_started(1);

    let bound = Duration::from_millis(200);
    let start = Instant::now();
    assert!(!rec.wait_until_idle(bound));
    let elapsed = start.elapsed();
    assert!(elapsed >= bound);
    assert!(elapsed < bound + Duration::from_secs(2));

    resolver.open();
}

#[test]
fn default_end_of_line_bound() {
    assert_eq!(settings().end_of_line_wait(), Duration::from_millis(2500));
}

#[test]
fn arena_exhaustion_rejects_enqueue() {
    let mut s = settings();
    s.arena_page_size = 8;
    s.arena_max_pages = 1;
    let resolver = GatedResolver::new(false, Recognition::Recognized);
    let rec = Recognizer::new(resolver.clone(), &s);

    assert!(rec.enqueue("aaaaaaaa", "aaaaaaaa"));
    assert!(!rec.enqueue("b", "b"));
    assert_eq!(rec.find("b"), None);
    resolver.open();
}

#[test]
fn recognize_queues_and_reports_unknown() {
    let resolver = GatedResolver::new(true, Recognition::Recognized);
    let rec = Recognizer::new(resolver, &settings());
    assert_eq!(rec.recognize("\"git\""), Recognition::Unknown);
    assert!(rec.wait_until_idle(LONG));
    assert_eq!(rec.recognize("git"), Recognition::Recognized);
    assert_eq!(rec.recognize("   "), Recognition::NotRecognized);
}

#[test]
fn case_folding_keys() {
    let mut s = settings();
    s.ignore_case = true;
    let rec = Recognizer::new(GatedResolver::new(true, Recognition::Recognized), &s);
    assert_eq!(rec.normalize("GiT"), "git");
}

#[test]
fn worker_signals_wake_event() {
    let resolver = GatedResolver::new(true, Recognition::Recognized);
    let rec = Recognizer::new(resolver, &settings());
    let wake = Arc::new(WakeEvent::new());
    rec.set_wake_event(Some(wake.clone()));
    assert!(rec.enqueue("git", "git"));
    assert!(wake.wait_timeout(LONG));
}

#[test]
fn concurrent_finds_are_safe() {
    let resolver = GatedResolver::new(true, Recognition::Recognized);
    let rec = Arc::new(Recognizer::new(resolver, &settings()));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let rec = Arc::clone(&rec);
            thread::spawn(move || {
                for _ in 0..200 {
                    let _ = rec.find("git");
                }
            })
        })
        .collect();
    for i in 0..50 {
        let word = format!("w{i}");
        rec.enqueue(&word, &word);
    }
    for r in readers {
        r.join().unwrap();
    }
    assert!(rec.wait_until_idle(LONG));
}

#[test]
fn codes() {
    assert_eq!(Recognition::NotRecognized.code(), -1);
    assert_eq!(Recognition::Recognized.code(), 1);
    assert!(!Recognition::Unknown.is_final());
    assert!(Recognition::Directory.is_final());
}
