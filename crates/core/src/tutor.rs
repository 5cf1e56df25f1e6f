//! Canned tutoring responses.
//!
//! The tutor is deterministic string dispatch, not a model call: classify the
//! request into explicit enums, then match into a fixed ladder of canned
//! text. Selection order: out-of-scope check, then runtime-error
//! classification, then topic detection, then an encouragement fallback.

use serde::{Deserialize, Serialize};

//
// ─── MODES AND LEVELS ──────────────────────────────────────────────────────────
//

/// Mode the student is asking from. XP is only awarded while learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TutorMode {
    Learn,
    Assessment,
}

/// The three-tier verbosity ladder: hint, then strategy, then snippet.
///
/// The level is derived solely from how many attempts the student has made,
/// never from the message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HelpLevel {
    /// A nudge in the right direction.
    Hint,
    /// A concrete approach to try.
    Strategy,
    /// A worked code snippet.
    Snippet,
}

impl HelpLevel {
    /// Escalation thresholds: fewer than 2 attempts gets a hint, fewer than 4
    /// a strategy, anything beyond a snippet.
    #[must_use]
    pub fn from_attempts(attempts: u32) -> Self {
        if attempts < 2 {
            HelpLevel::Hint
        } else if attempts < 4 {
            HelpLevel::Strategy
        } else {
            HelpLevel::Snippet
        }
    }

    /// Numeric level, 1 through 3.
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            HelpLevel::Hint => 1,
            HelpLevel::Strategy => 2,
            HelpLevel::Snippet => 3,
        }
    }
}

//
// ─── CLASSIFICATION ────────────────────────────────────────────────────────────
//

/// Runtime error family recognized from an interpreter message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Name,
    Syntax,
    Indentation,
    Other,
}

impl ErrorKind {
    /// Classifies an interpreter error message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.contains("NameError") {
            ErrorKind::Name
        } else if message.contains("SyntaxError") {
            ErrorKind::Syntax
        } else if message.contains("IndentationError") {
            ErrorKind::Indentation
        } else {
            ErrorKind::Other
        }
    }
}

/// Lesson topic recognized from the student's own words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Variables,
    Input,
    Print,
    Loops,
}

impl Topic {
    /// Detects the first matching topic keyword, if any.
    #[must_use]
    pub fn detect(message: &str) -> Option<Self> {
        let message = message.to_lowercase();
        if message.contains("variable") {
            Some(Topic::Variables)
        } else if message.contains("input") {
            Some(Topic::Input)
        } else if message.contains("print") {
            Some(Topic::Print)
        } else if message.contains("loop") {
            Some(Topic::Loops)
        } else {
            None
        }
    }
}

/// What kind of reply the selector produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    OutOfScope,
    ErrorHelp,
    ConceptHelp,
    Encouragement,
}

impl ResponseKind {
    /// Storage token for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::OutOfScope => "out_of_scope",
            ResponseKind::ErrorHelp => "error_help",
            ResponseKind::ConceptHelp => "concept_help",
            ResponseKind::Encouragement => "encouragement",
        }
    }
}

//
// ─── REQUEST / REPLY ───────────────────────────────────────────────────────────
//

/// One tutoring turn as seen by the selector. The selector holds no state of
/// its own; everything it needs is passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorRequest {
    pub message: String,
    pub attempt_count: u32,
    pub error_message: Option<String>,
    pub mode: TutorMode,
}

/// The selected canned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorReply {
    pub text: String,
    pub kind: ResponseKind,
    pub help_level: HelpLevel,
    pub xp_reward: u32,
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Scope policy for the tutor: which phrases put a message out of scope, and
/// how much XP each help level earns while learning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorPolicy {
    blocked_phrases: Vec<String>,
}

impl Default for TutorPolicy {
    fn default() -> Self {
        Self {
            blocked_phrases: [
                "do my homework",
                "give me the answer",
                "answer key",
                "minecraft",
                "fortnite",
                "hack",
            ]
            .iter()
            .map(|phrase| (*phrase).to_string())
            .collect(),
        }
    }
}

impl TutorPolicy {
    /// Creates a policy with a custom blocklist. Phrases match
    /// case-insensitively as substrings.
    #[must_use]
    pub fn new(blocked_phrases: Vec<String>) -> Self {
        Self {
            blocked_phrases: blocked_phrases
                .into_iter()
                .map(|phrase| phrase.to_lowercase())
                .collect(),
        }
    }

    /// Whether the message contains any blocked phrase.
    #[must_use]
    pub fn is_blocked(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.blocked_phrases
            .iter()
            .any(|phrase| message.contains(phrase))
    }

    /// Selects the canned reply for a request.
    ///
    /// The help level depends only on the attempt count. A blocked phrase
    /// short-circuits everything else, including error and topic matches.
    #[must_use]
    pub fn respond(&self, request: &TutorRequest) -> TutorReply {
        let help_level = HelpLevel::from_attempts(request.attempt_count);

        if self.is_blocked(&request.message) {
            return TutorReply {
                text: OUT_OF_SCOPE.to_string(),
                kind: ResponseKind::OutOfScope,
                help_level,
                xp_reward: 0,
            };
        }

        if let Some(error) = request.error_message.as_deref() {
            let kind = ErrorKind::classify(error);
            return TutorReply {
                text: error_help(kind, help_level).to_string(),
                kind: ResponseKind::ErrorHelp,
                help_level,
                xp_reward: xp_for(request.mode, help_level),
            };
        }

        if let Some(topic) = Topic::detect(&request.message) {
            return TutorReply {
                text: concept_help(topic, help_level).to_string(),
                kind: ResponseKind::ConceptHelp,
                help_level,
                xp_reward: xp_for(request.mode, help_level),
            };
        }

        // Deterministic pick so the same attempt always gets the same line.
        let index = request.attempt_count as usize % ENCOURAGEMENTS.len();
        TutorReply {
            text: ENCOURAGEMENTS[index].to_string(),
            kind: ResponseKind::Encouragement,
            help_level,
            xp_reward: xp_for(request.mode, help_level),
        }
    }
}

fn xp_for(mode: TutorMode, level: HelpLevel) -> u32 {
    match mode {
        TutorMode::Learn => match level {
            HelpLevel::Hint => 5,
            HelpLevel::Strategy => 10,
            HelpLevel::Snippet => 15,
        },
        TutorMode::Assessment => 0,
    }
}

//
// ─── CANNED TEXT ───────────────────────────────────────────────────────────────
//

const OUT_OF_SCOPE: &str =
    "That's outside what I can help with here. Let's stay on the mission: \
     ask me about the code or concept you're working on.";

fn error_help(kind: ErrorKind, level: HelpLevel) -> &'static str {
    match (kind, level) {
        (ErrorKind::Name, HelpLevel::Hint) => {
            "A NameError means Python doesn't know that name yet. Check your spelling."
        }
        (ErrorKind::Name, HelpLevel::Strategy) => {
            "A NameError means you used a variable before defining it. Find where the \
             name first appears and make sure a line above it assigns a value with `=`."
        }
        (ErrorKind::Name, HelpLevel::Snippet) => {
            "Define the variable before you use it:\n\n    agent_name = \"Nova\"\n    \
             print(agent_name)\n\nThe assignment must run before any line that reads it."
        }
        (ErrorKind::Syntax, HelpLevel::Hint) => {
            "A SyntaxError means a line isn't valid Python. Look closely at the line number \
             in the message."
        }
        (ErrorKind::Syntax, HelpLevel::Strategy) => {
            "Check the reported line for unbalanced quotes or parentheses, and make sure \
             statements like `if` and `for` end with a colon."
        }
        (ErrorKind::Syntax, HelpLevel::Snippet) => {
            "A correct `if` statement looks like:\n\n    if score > 10:\n        \
             print(\"win\")\n\nNote the colon and the matching quotes."
        }
        (ErrorKind::Indentation, HelpLevel::Hint) => {
            "An IndentationError means the spacing at the start of a line is off."
        }
        (ErrorKind::Indentation, HelpLevel::Strategy) => {
            "Every line inside an `if`, `for` or function body must be indented the same \
             amount. Pick four spaces and use it everywhere."
        }
        (ErrorKind::Indentation, HelpLevel::Snippet) => {
            "Indent the body consistently:\n\n    for step in range(3):\n        \
             print(step)\n\nFour spaces, no tabs mixed in."
        }
        (ErrorKind::Other, HelpLevel::Hint) => {
            "Read the last line of the error message first; it names what went wrong."
        }
        (ErrorKind::Other, HelpLevel::Strategy) => {
            "Read the error bottom-up: the last line says what broke, the lines above say \
             where. Go to that line and check the values you're using."
        }
        (ErrorKind::Other, HelpLevel::Snippet) => {
            "Add a print just before the failing line to see what your values really \
             are:\n\n    print(repr(value))\n\nThen compare against what you expected."
        }
    }
}

fn concept_help(topic: Topic, level: HelpLevel) -> &'static str {
    match (topic, level) {
        (Topic::Variables, HelpLevel::Hint) => {
            "A variable is a named box for a value. You fill it with `=`."
        }
        (Topic::Variables, HelpLevel::Strategy) => {
            "Pick a descriptive name, assign with `=`, then reuse the name anywhere you \
             need the value. Assigning again replaces what's in the box."
        }
        (Topic::Variables, HelpLevel::Snippet) => {
            "    energy = 100\n    energy = energy - 25\n    print(energy)  # 75"
        }
        (Topic::Input, HelpLevel::Hint) => {
            "`input()` pauses the program and waits for the user to type something."
        }
        (Topic::Input, HelpLevel::Strategy) => {
            "Call `input()` with a prompt string and store the result in a variable. \
             Remember it always returns text, so convert with `int()` if you need a number."
        }
        (Topic::Input, HelpLevel::Snippet) => {
            "    name = input(\"Agent name: \")\n    age = int(input(\"Age: \"))\n    \
             print(name, age)"
        }
        (Topic::Print, HelpLevel::Hint) => {
            "`print()` writes a value to the screen. Put what you want shown in the \
             parentheses."
        }
        (Topic::Print, HelpLevel::Strategy) => {
            "You can print several values by separating them with commas, or build one \
             string with an f-string: `print(f\"score: {score}\")`."
        }
        (Topic::Print, HelpLevel::Snippet) => {
            "    score = 42\n    print(\"score:\", score)\n    print(f\"score: {score}\")"
        }
        (Topic::Loops, HelpLevel::Hint) => {
            "A loop repeats a block of code. `for` repeats a known number of times."
        }
        (Topic::Loops, HelpLevel::Strategy) => {
            "Use `for i in range(n):` to repeat n times, and indent every line that \
             should repeat. The loop variable counts from 0 to n-1."
        }
        (Topic::Loops, HelpLevel::Snippet) => {
            "    for wave in range(3):\n        print(\"wave\", wave)\n\nPrints waves \
             0, 1 and 2."
        }
    }
}

const ENCOURAGEMENTS: [&str; 4] = [
    "You're on the right track. Walk through your code one line at a time and say out \
     loud what each line does.",
    "Good question. Break the problem into the smallest step you can do right now and \
     start there.",
    "Keep going. Compare your code against the example in the Learn section and spot \
     the first difference.",
    "Almost there. Re-read the instructions and check your code does each requirement \
     in order.",
];

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
