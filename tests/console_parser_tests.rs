//! Parser tests for console command line parsing

use rust_vehicle_console::console::parser::{parse_line, MAX_ARGS};
use rust_vehicle_console::console::ConsoleError;

#[test]
fn test_parse_simple_command() {
    let cmd = parse_line("help").unwrap();
    assert_eq!(cmd.command, "help");
    assert_eq!(cmd.arg(0), None);
}

#[test]
fn test_parse_command_with_args() {
    let cmd = parse_line("monitor yes").unwrap();
    assert_eq!(cmd.command, "monitor");
    assert_eq!(cmd.arg(0), Some("yes"));
    assert_eq!(cmd.arg(1), None);
    assert_eq!(cmd.argc(), 1);
}

#[test]
fn test_parse_trims_whitespace() {
    let cmd = parse_line("  level   debug  ").unwrap();
    assert_eq!(cmd.command, "level");
    assert_eq!(cmd.args, ["debug"]);
}

#[test]
fn test_parse_empty_line() {
    let cmd = parse_line("").unwrap();
    assert_eq!(cmd.command, "");
    assert_eq!(cmd.argc(), 0);
}

#[test]
fn test_parse_max_args() {
    let line = format!("obd {}", vec!["x"; MAX_ARGS].join(" "));
    assert_eq!(parse_line(&line).unwrap().argc(), MAX_ARGS);

    let line = format!("obd {}", vec!["x"; MAX_ARGS + 1].join(" "));
    assert_eq!(parse_line(&line).unwrap_err(), ConsoleError::TooManyArgs);
}
