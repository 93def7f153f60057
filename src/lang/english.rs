use crate::greetings::Greeter;

#[derive(Debug, Default, Clone, Copy)]
pub struct English;

impl Greeter for English {
    fn name(&self) -> &str {
        "english"
    }

    fn hello(&self) -> &str {
        "Hello!"
    }

    fn good_morning(&self) -> &str {
        "Good morning!"
    }

    fn good_afternoon(&self) -> &str {
        "Good afternoon!"
    }

    fn good_night(&self) -> &str {
        "Good night!"
    }

    fn good_bye(&self) -> &str {
        "Goodbye!"
    }
}
