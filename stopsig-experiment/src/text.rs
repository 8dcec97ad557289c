//! Participant-facing text, kept in one place so a lab can reword it without
//! touching the engine.

pub const WELCOME_LINES: &[&str] = &[
    "Welcome to the experiment.",
    "",
    "Respond to the white arrows as quickly and as accurately as possible:",
    "LEFT ARROW KEY for a left arrow, RIGHT ARROW KEY for a right arrow.",
    "",
    "On some trials the arrow will turn red after a variable delay.",
    "Try to stop your response when that happens.",
    "",
    "Do not wait for the red signal: if you slow down, it will only",
    "appear later and your reaction times will suffer.",
    "",
    "Press SPACE to start with a practice block.",
];

pub const GET_READY: &str = "Get ready...";
pub const PRACTICE_MODE: &str = "PRACTICE MODE";

// trial by trial feedback during practice
pub const CORRECT_MSG: &str = "correct response";
pub const INCORRECT_MSG: &str = "incorrect response";
pub const TOO_SLOW_MSG: &str = "too slow";
pub const CORRECT_STOP_MSG: &str = "correct stop";
pub const INCORRECT_STOP_MSG: &str = "remember: try to stop";

// block feedback
pub const GO_HEADER: &str = "GO TRIALS:";
pub const STOP_HEADER: &str = "STOP-SIGNAL TRIALS:";
pub const BREAK_MSG: &str = "You can take a short break.";
pub const END_LINES: &[&str] = &[
    "Thank you for your participation.",
    "",
    "Press ESC to close the experiment.",
];
