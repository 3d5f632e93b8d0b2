//! Prompt construction for question generation.

use crate::cache::item::{Category, Item, Key};

pub const SYSTEM_PROMPT: &str = "You are an expert in computational complexity theory. \
Generate educational questions about P, NP, NP-Complete, and NP-Hard problems. \
Questions must be factually accurate, have exactly one best answer, and come with an \
explanation consistent with that answer. Every option should be a technically accurate \
statement; avoid obviously false distractors. Use precise technical language suitable \
for computer science students. Respond with valid JSON only.";

const RESPONSE_FORMAT: &str = r#"Format your response as JSON:
{
    "question": "The question text",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "correct_answer": "Option A",
    "explanation": "Why the answer is correct and why the other options are not"
}"#;

fn difficulty_description(difficulty: u8) -> &'static str {
    match difficulty {
        1 => "beginner (basic concepts)",
        2 => "easy (simple examples)",
        4 => "hard (complex analysis)",
        5 => "expert (advanced theory)",
        _ => "medium (practical applications)",
    }
}

fn example_problems(category: Category) -> &'static str {
    match category {
        Category::P => {
            "Binary search, sorting algorithms, shortest path (Dijkstra), matrix multiplication"
        }
        Category::Np => {
            "Verifying Hamiltonian paths, checking graph colorings, verifying subset sums"
        }
        Category::NpComplete => {
            "3-SAT, Hamiltonian path, Traveling Salesman (decision), Vertex Cover, Knapsack (decision)"
        }
        Category::NpHard => "Traveling Salesman (optimization), Maximum Clique, Halting Problem",
        Category::Conceptual => "",
    }
}

fn fact_check(category: Category) -> &'static str {
    match category {
        Category::P => {
            "FACT CHECK for P problems:
- P problems are solvable in polynomial time by deterministic algorithms
- P problems have known efficient algorithms by definition
- P is a subset of NP, not a superset
- P problems are not NP-complete unless P=NP, which is unproven"
        }
        Category::Np => {
            "FACT CHECK for NP problems:
- NP problems can be verified in polynomial time
- NP problems may or may not be solvable in polynomial time
- P is contained in NP
- NP includes both P and the NP-complete problems"
        }
        Category::NpComplete => {
            "FACT CHECK for NP-Complete problems:
- They are the hardest problems in NP
- Every NP problem reduces to any NP-complete problem
- No polynomial-time algorithm is known for any of them
- A polynomial algorithm for one of them would prove P=NP"
        }
        Category::NpHard => {
            "FACT CHECK for NP-Hard problems:
- At least as hard as the NP-complete problems
- Need not be in NP themselves and may be undecidable
- Often the optimization versions of NP-complete problems"
        }
        Category::Conceptual => "",
    }
}

/// User prompt asking for one question in `key`'s pool.
pub fn question_prompt(key: &Key) -> String {
    let category = key.category();
    if category == Category::Conceptual {
        return conceptual_prompt("complexity theory");
    }

    format!(
        "Generate a {level} level question about {category} problems.
{facts}

Examples of {category} problems: {examples}.

The question should test understanding of:
- What {category} means
- Examples of {category} problems
- How to identify {category} problems
- Relationships between complexity classes

Requirements:
1. All options must be technically accurate statements
2. Exactly one option is the best answer
3. correct_answer must exactly match one of the options
4. The explanation must agree with correct_answer

{format}",
        level = difficulty_description(key.difficulty()),
        facts = fact_check(category),
        examples = example_problems(category),
        format = RESPONSE_FORMAT,
    )
}

/// User prompt for a general theory question on `topic`.
pub fn conceptual_prompt(topic: &str) -> String {
    format!(
        "Generate a conceptual question about {topic} in computational complexity theory.

Possible topics:
- The P vs NP problem
- Reductions between problems
- Time and space complexity
- Decidability and undecidability
- Polynomial time algorithms
- NP-completeness proofs

{RESPONSE_FORMAT}"
    )
}

/// User prompt asking for a longer, plain-text explanation of an answer.
pub fn explanation_prompt(item: &Item, user_answer: &str) -> String {
    let options = item
        .options()
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {o}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let verdict = if user_answer == item.correct_text() {
        "CORRECT"
    } else {
        "INCORRECT"
    };

    format!(
        "A student just answered a question about {category} problems.

Question: {question}

Options:
{options}

Correct answer: {correct}
Student's answer: {user_answer}
The student was {verdict}.

Previous explanation: {explanation}

Write a detailed explanation that covers why the correct answer is right, why each other \
option is wrong, and how this connects to the wider theory. If the student was wrong, \
address the likely misconception. Return plain text only, not JSON.",
        category = item.category(),
        question = item.prompt(),
        correct = item.correct_text(),
        explanation = item.explanation(),
    )
}
