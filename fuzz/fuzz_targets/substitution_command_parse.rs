#![no_main]

use libfuzzer_sys::fuzz_target;
use subbot_substitution::{SubstitutionCommand, SubstitutionError};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Some(command) = SubstitutionCommand::parse(&raw) else {
        return;
    };
    assert!(!command.pattern.is_empty());
    assert!(!command.replacement.contains('\n'));

    match command.run(&raw) {
        Ok(output) => assert_ne!(output, raw),
        Err(SubstitutionError::NoEffect) | Err(SubstitutionError::InvalidPattern { .. }) => {}
    }
});
