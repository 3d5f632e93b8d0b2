//! The AI question mode: pick a category, answer a short round, repeat.

use std::io::Write;

use tracing::{debug, info, warn};

use crate::cache::facade::QuestionCache;
use crate::cache::item::{Category, Item, Key};
use crate::config::QuizConfig;
use crate::generation::anthropic::AnthropicClient;
use crate::quiz::input::{Input, InputReader};

/// Running score for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub asked: usize,
    pub correct: usize,
    pub skipped: usize,
}

enum Flow {
    Continue,
    Quit,
}

pub struct Session<'a, W: Write> {
    cache: &'a QuestionCache,
    explainer: Option<&'a AnthropicClient>,
    config: &'a QuizConfig,
    input: InputReader,
    out: W,
    score: Score,
}

impl<'a, W: Write> Session<'a, W> {
    pub fn new(
        cache: &'a QuestionCache,
        explainer: Option<&'a AnthropicClient>,
        config: &'a QuizConfig,
        input: InputReader,
        out: W,
    ) -> Self {
        Self {
            cache,
            explainer,
            config,
            input,
            out,
            score: Score::default(),
        }
    }

    pub fn score(&self) -> Score {
        self.score
    }

    /// Run menus until the player leaves or input closes.
    pub async fn run(&mut self) -> std::io::Result<Score> {
        loop {
            let Some(category) = self.choose_category().await? else {
                break;
            };

            let key = match category {
                Category::Conceptual => Key::conceptual(),
                other => Key::new(other, self.config.difficulty),
            };

            info!(key = %key, "Starting round");
            if let Flow::Quit = self.play_round(&key).await? {
                break;
            }
        }

        writeln!(
            self.out,
            "\nSession over: {} of {} correct.",
            self.score.correct, self.score.asked
        )?;
        Ok(self.score)
    }

    async fn choose_category(&mut self) -> std::io::Result<Option<Category>> {
        loop {
            writeln!(self.out, "\nAI QUESTION MODE")?;
            writeln!(self.out, "{}", "=".repeat(30))?;
            for (i, category) in Category::ALL.iter().enumerate() {
                writeln!(self.out, "{}. {}", i + 1, category)?;
            }
            writeln!(self.out, "{}. Quit", Category::ALL.len() + 1)?;
            write!(self.out, "Enter choice: ")?;
            self.out.flush()?;

            let line = match self.input.read_line(None).await {
                Input::Line(line) => line,
                Input::TimedOut | Input::Closed => return Ok(None),
            };

            match line.parse::<usize>() {
                Ok(n) if (1..=Category::ALL.len()).contains(&n) => {
                    return Ok(Some(Category::ALL[n - 1]));
                }
                Ok(n) if n == Category::ALL.len() + 1 => return Ok(None),
                _ => writeln!(self.out, "Invalid choice.")?,
            }
        }
    }

    async fn play_round(&mut self, key: &Key) -> std::io::Result<Flow> {
        for _ in 0..self.config.questions_per_round {
            match self.fetch(key).await {
                Some(item) => {
                    if let Flow::Quit = self.ask(&item).await? {
                        return Ok(Flow::Quit);
                    }
                }
                None => {
                    self.score.skipped += 1;
                    writeln!(
                        self.out,
                        "Could not get a question right now. Skipping to the next one."
                    )?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Look up a question, trying again when every tier comes up empty.
    async fn fetch(&mut self, key: &Key) -> Option<Item> {
        let attempts = self.config.retries.max(1);
        for attempt in 1..=attempts {
            if let Some(item) = self.cache.get(key).await {
                return Some(item);
            }
            if attempt < attempts {
                debug!(key = %key, attempt, "No question available, retrying");
            }
        }
        warn!(key = %key, attempts, "No question available");
        None
    }

    async fn ask(&mut self, item: &Item) -> std::io::Result<Flow> {
        writeln!(self.out, "\n[{}] {}", item.category(), item.prompt())?;
        for (i, option) in item.options().iter().enumerate() {
            writeln!(self.out, "  {}. {}", i + 1, option)?;
        }

        let choice = loop {
            write!(self.out, "Your answer (1-{}): ", item.options().len())?;
            self.out.flush()?;
            match self.input.read_line(self.config.answer_timeout()).await {
                Input::Line(line) => match line.parse::<usize>() {
                    Ok(n) if (1..=item.options().len()).contains(&n) => break n - 1,
                    _ => writeln!(self.out, "Please enter a number between 1 and {}.", item.options().len())?,
                },
                Input::TimedOut => {
                    writeln!(self.out, "\nOut of time.")?;
                    self.score.asked += 1;
                    self.show_answer(item)?;
                    return Ok(Flow::Continue);
                }
                Input::Closed => return Ok(Flow::Quit),
            }
        };

        self.score.asked += 1;
        if item.is_correct(choice) {
            self.score.correct += 1;
            writeln!(self.out, "Correct!")?;
        } else {
            writeln!(self.out, "Incorrect.")?;
        }
        self.show_answer(item)?;

        if let Some(explainer) = self.explainer {
            write!(self.out, "Press 'd' for a detailed explanation, Enter to continue: ")?;
            self.out.flush()?;
            match self.input.read_line(self.config.answer_timeout()).await {
                Input::Line(line) if line.eq_ignore_ascii_case("d") => {
                    writeln!(self.out, "Generating detailed explanation...")?;
                    let user_answer = &item.options()[choice];
                    match explainer.explain(item, user_answer).await {
                        Ok(text) => writeln!(self.out, "\n{text}")?,
                        Err(e) => {
                            warn!(kind = e.kind(), error = %e, "Detailed explanation failed");
                            writeln!(self.out, "Failed to generate a detailed explanation.")?;
                        }
                    }
                }
                Input::Closed => return Ok(Flow::Quit),
                _ => {}
            }
        }
        Ok(Flow::Continue)
    }

    fn show_answer(&mut self, item: &Item) -> std::io::Result<()> {
        writeln!(self.out, "Answer: {}", item.correct_text())?;
        if !item.explanation().is_empty() {
            writeln!(self.out, "{}", item.explanation())?;
        }
        Ok(())
    }
}
