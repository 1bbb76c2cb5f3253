//! `erpeto classify`: Show the randomness verdict for values.

use erpeto_analyser::is_likely_random;

pub fn run(values: &[String]) {
    for value in values {
        println!("{}\t{value}", verdict(value));
    }
}

fn verdict(value: &str) -> &'static str {
    if is_likely_random(value) {
        "random"
    } else {
        "structured"
    }
}
