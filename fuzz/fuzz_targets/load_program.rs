#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(program) = pare_syntax::Program::from_json(s) {
            let rendered = pare_syntax::render(&program);
            assert_eq!(rendered.layout.len(), program.scopes.len());
            let _ = pare_min::Inventory::scan(&program);
        }
    }
});
