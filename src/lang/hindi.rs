use crate::greetings::Greeter;

#[derive(Debug, Default, Clone, Copy)]
pub struct Hindi;

impl Greeter for Hindi {
    fn name(&self) -> &str {
        "hindi"
    }

    fn hello(&self) -> &str {
        "नमस्ते! (Namaste!)"
    }

    fn good_morning(&self) -> &str {
        "शुभ प्रभात! (Shubh Prabhat!)"
    }

    fn good_afternoon(&self) -> &str {
        "शुभ दोपहर! (Shubh Dophar)"
    }

    fn good_night(&self) -> &str {
        "शुभ रात्रि! (Shubh Ratri!)"
    }

    fn good_bye(&self) -> &str {
        "अलविदा! (Alvida!)"
    }
}
