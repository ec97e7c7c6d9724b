use assert_cmd::Command;

pub fn jdists_cmd() -> Command {
	let mut cmd = Command::cargo_bin("jdists").expect("jdists binary should build");
	cmd.env("NO_COLOR", "1");
	cmd
}
