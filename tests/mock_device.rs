use elmobd::{ElmChannel, MockDevice, mock::NOT_SUPPORTED};

fn outputs(dev: &dyn ElmChannel, cmd: &str) -> Vec<String> {
    let res = dev.run_command(cmd);
    assert!(res.get_error().is_none(), "mock failed on {cmd:?}");
    res.get_outputs().to_vec()
}

#[test]
pub fn test_mock_never_fails() {
    let dev = MockDevice::new();
    let commands = [
        "", "A", "ATZ", "ATSP0", "AT@1", "01", "010", "0100", "01FF", "01ZZ", "02", "0902",
        "0101", "012F", "0131", "01 0C", "\u{e9}\u{e9}", "01\u{e9}",
    ];
    for cmd in commands {
        let res = dev.run_command(cmd);
        assert!(!res.failed());
        assert!(!res.get_outputs().is_empty());
    }
}

#[test]
pub fn test_mock_canned_answers() {
    let dev = MockDevice::new();
    assert_eq!(outputs(&dev, "ATSP0"), vec!["OK"]);
    assert_eq!(outputs(&dev, "AT@1"), vec!["OBDII by elm329@gmail.com"]);
    assert_eq!(outputs(&dev, "010C"), vec!["41 0C 03 00"]);
    assert_eq!(outputs(&dev, "0105"), vec!["41 05 4F"]);
    assert_eq!(outputs(&dev, "01FF"), vec![NOT_SUPPORTED]);
}

#[test]
pub fn test_mock_overview() {
    let res = MockDevice::new().run_command("010C");
    assert!(res.format_overview().contains("Mocked command \"010C\""));
    assert!(!res.format_overview().contains("Spent"));
}
