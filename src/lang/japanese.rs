use crate::greetings::Greeter;

#[derive(Debug, Default, Clone, Copy)]
pub struct Japanese;

impl Greeter for Japanese {
    fn name(&self) -> &str {
        "japanese"
    }

    fn hello(&self) -> &str {
        "こんにちは! (Konnichiwa)"
    }

    fn good_morning(&self) -> &str {
        "おはようございます! (Ohayou gozaimasu)"
    }

    fn good_afternoon(&self) -> &str {
        "こんにちは! (Konnichiwa)"
    }

    fn good_night(&self) -> &str {
        "おやすみなさい! (Oyasumi nasai)"
    }

    fn good_bye(&self) -> &str {
        "さようなら! (Sayounara)"
    }
}
