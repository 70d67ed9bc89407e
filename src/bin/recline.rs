use std::fs;
use std::io::{Read, Write};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use recline_engine::classify::{Classifications, WordClass};
use recline_engine::popen::{CloseStatus, HandleId, PopenRegistry};
use recline_engine::recognizer::{Recognition, Recognizer};
use recline_engine::settings::{self, settings};

#[derive(Parser)]
#[command(name = "recline", about = "Recline engine diagnostics")]
struct Cli {
    /// Settings TOML overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<String>,

    /// Output as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve words the way the background recognizer does
    Recognize { words: Vec<String> },

    /// Color a command line by word class
    Classify {
        line: String,
        /// Mark the command word as having an argmatcher
        #[arg(long)]
        argmatcher: bool,
    },

    /// Run a command through the asynchronous popen relay
    Popen {
        command: String,
        #[arg(long, default_value = "r")]
        mode: String,
        /// Give up waiting for the relay after this many milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,
    },

    /// Feed input to a command over a read/write pipe pair
    Popenrw {
        command: String,
        input: String,
        #[arg(long, default_value = "t")]
        mode: String,
    },

    /// Print the built-in default settings
    Settings,
}

#[derive(Serialize)]
struct WordResult {
    word: String,
    recognition: Recognition,
    code: i8,
}

#[derive(Serialize)]
struct ClassifyResult {
    line: String,
    faces: String,
    command: Option<WordResult>,
}

#[derive(Serialize)]
struct PopenResult {
    command: String,
    output: String,
    ready: bool,
    exit_code: Option<i32>,
}

fn die(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{context}: {err}");
    process::exit(1);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => die("JSON serialization failed", e),
    }
}

fn recognize_all(words: &[String]) -> Vec<WordResult> {
    let recognizer = Recognizer::with_path_resolver(&settings().recognizer);
    let bound = settings().recognizer.end_of_line_wait();
    words
        .iter()
        .map(|word| {
            let recognition = recognizer.recognize_wait(word, bound);
            if !recognition.is_final() {
                eprintln!("{word}: not resolved within the end-of-line wait");
            }
            WordResult {
                word: word.clone(),
                recognition,
                code: recognition.code(),
            }
        })
        .collect()
}

fn word_spans(line: &str) -> Vec<std::ops::Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..line.len());
    }
    spans
}

fn read_to_string(registry: &mut PopenRegistry, id: HandleId) -> String {
    let Some(reader) = registry.reader(id) else {
        die("popen", "read handle missing");
    };
    let mut bytes = Vec::new();
    if let Err(e) = reader.read_to_end(&mut bytes) {
        die("read failed", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn exit_code(status: CloseStatus) -> Option<i32> {
    match status {
        CloseStatus::Exited(code) => Some(code),
        CloseStatus::Closed | CloseStatus::Detached => None,
    }
}

fn print_popen(result: &PopenResult, json: bool) {
    if json {
        print_json(result);
    } else {
        print!("{}", result.output);
        if let Some(code) = result.exit_code {
            eprintln!("[exit {code}]");
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        let content = fs::read_to_string(path).unwrap_or_else(|e| die(path, e));
        if let Err(e) = settings::init_custom(content) {
            die(path, e);
        }
    }

    let json = cli.json;
    match cli.command {
        Command::Recognize { words } => {
            let results = recognize_all(&words);
            if json {
                print_json(&results);
            } else {
                for r in &results {
                    println!("{:>3}  {:<15}{}", r.code, format!("{:?}", r.recognition), r.word);
                }
            }
        }

        Command::Classify { line, argmatcher } => {
            let spans = word_spans(&line);
            let words: Vec<String> = spans
                .first()
                .map(|s| line[s.clone()].to_string())
                .into_iter()
                .collect();
            let command = recognize_all(&words).into_iter().next();
            let command_class = command.as_ref().and_then(|r| r.recognition.word_class());

            let mut classifications = Classifications::new(line.len());
            let first = classifications.add_command(&spans);
            for (i, span) in spans.iter().enumerate() {
                let class = match (i, command_class) {
                    (0, Some(class)) => class,
                    (0, None) => continue,
                    _ if line[span.clone()].starts_with('-') => WordClass::Flag,
                    _ => WordClass::Arg,
                };
                if let Err(e) = classifications.classify_word(first + i, class, true) {
                    die("classify", e);
                }
            }
            if argmatcher {
                classifications.set_word_has_argmatcher(first);
            }
            classifications.finish(argmatcher);

            let faces = String::from_utf8_lossy(classifications.faces()).into_owned();
            if json {
                print_json(&ClassifyResult {
                    line,
                    faces,
                    command,
                });
            } else {
                println!("{line}");
                println!("{faces}");
            }
        }

        Command::Popen {
            command,
            mode,
            timeout_ms,
        } => {
            let mut registry = PopenRegistry::new(settings().popen.clone());
            let (id, guard) = registry
                .popen_yield(&command, &mode, None)
                .unwrap_or_else(|e| die("popen", e));
            let ready = guard.wait(Duration::from_millis(timeout_ms));
            let output = if ready {
                read_to_string(&mut registry, id)
            } else {
                String::new()
            };
            let status = registry.close(id).unwrap_or_else(|e| die("close", e));
            print_popen(
                &PopenResult {
                    command,
                    output,
                    ready,
                    exit_code: exit_code(status),
                },
                json,
            );
        }

        Command::Popenrw {
            command,
            input,
            mode,
        } => {
            let mut registry = PopenRegistry::new(settings().popen.clone());
            let (r, w) = registry
                .popen_rw(&command, &mode)
                .unwrap_or_else(|e| die("popenrw", e));
            if let Some(writer) = registry.writer(w) {
                if let Err(e) = writer.write_all(input.as_bytes()).and_then(|_| writer.flush()) {
                    die("write failed", e);
                }
            }
            registry.close(w).unwrap_or_else(|e| die("close", e));
            let output = read_to_string(&mut registry, r);
            let status = registry.close(r).unwrap_or_else(|e| die("close", e));
            print_popen(
                &PopenResult {
                    command,
                    output,
                    ready: true,
                    exit_code: exit_code(status),
                },
                json,
            );
        }

        Command::Settings => print!("{}", settings::default_toml()),
    }
}
