use std::path::Path;
use std::path::PathBuf;

use rstest::rstest;
use similar_asserts::assert_eq;

use super::*;
use crate::scanner;
use crate::text;

fn write_file(dir: &Path, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap();
	}
	std::fs::write(&path, content).unwrap();
	path
}

fn build_default(path: &Path) -> JdistsResult<String> {
	BuildSession::new(BuildOptions::default()).build(path)
}

fn collect_blocks(input: &str) -> JdistsResult<Vec<(String, String, String)>> {
	let mut found = Vec::new();
	scanner::scan(
		input,
		&mut |m| {
			found.push((
				m.tag.to_string(),
				m.attr_text.trim().to_string(),
				m.body.to_string(),
			));
			Ok(m.raw())
		},
		false,
	)?;
	Ok(found)
}

#[rstest]
#[case::html_self_closing(r#"<!--include file="a.js" -->"#, "include", r#"file="a.js""#, "")]
#[case::html_comment_close("<!--tpl-->body<!--/tpl-->", "tpl", "", "body")]
#[case::html_bare_close("<!--tpl>body</tpl-->", "tpl", "", "body")]
#[case::block_self_closing(r#"/*<include file="a.js" />*/"#, "include", r#"file="a.js""#, "")]
#[case::block_comment_close("/*<tpl>*/body/*</tpl>*/", "tpl", "", "body")]
#[case::block_bare_close("/*<tpl>body</tpl>*/", "tpl", "", "body")]
fn scanner_matches_each_marker_shape(
	#[case] input: &str,
	#[case] tag: &str,
	#[case] attrs: &str,
	#[case] body: &str,
) -> JdistsResult<()> {
	let found = collect_blocks(input)?;
	assert_eq!(found, vec![(tag.to_string(), attrs.to_string(), body.to_string())]);

	Ok(())
}

#[rstest]
#[case::bare_less_than("for (i = 0; i < n; i++) {}")]
#[case::comment_without_tag("<!-- just a comment -->")]
#[case::unterminated_marker("a <!--open with no close")]
#[case::block_marker_in_expression("x /*< y")]
#[case::self_closing_non_include("<!--foo/-->")]
fn scanner_passes_malformed_markers_through(#[case] input: &str) -> JdistsResult<()> {
	let output = scanner::scan(input, &mut |m| Ok(m.raw()), false)?;
	assert_eq!(output, input);
	assert!(collect_blocks(input)?.is_empty());

	Ok(())
}

#[test]
fn scanner_reassembles_matches_exactly() -> JdistsResult<()> {
	let input = "a\n<!--x-->one<!--/x-->\nb /*<y attr=\"v\">*/two/*</y>*/ c";
	let output = scanner::scan(input, &mut |m| Ok(m.raw()), false)?;
	assert_eq!(output, input);

	Ok(())
}

#[test]
fn scanner_expands_comment_template_macro() -> JdistsResult<()> {
	let input = "var doc = /*#*/function() {/*hello world*/};";
	let output = scanner::scan(input, &mut |m| Ok(m.raw()), true)?;
	assert_eq!(output, "var doc = \"hello world\";");

	Ok(())
}

#[test]
fn scanner_expands_parameter_names_macro() -> JdistsResult<()> {
	let input = "run(/*,*/function add(a, b) { return a + b; });";
	let output = scanner::scan(input, &mut |m| Ok(m.raw()), true)?;
	assert_eq!(
		output,
		"run(['a', 'b'], function add(a, b) { return a + b; });"
	);

	Ok(())
}

#[test]
fn attributes_keep_the_last_duplicate() {
	let base = Path::new("/tmp/base");
	let attrs = parse_attributes(r#" file="a.js" trigger="dev" file="b.js""#, base);
	assert_eq!(attrs.file(), Some("b.js"));
	assert_eq!(attrs.get("trigger"), Some("dev"));
	assert!(
		attrs
			.file_path
			.as_ref()
			.is_some_and(|path| path.ends_with("base/b.js"))
	);
}

#[test]
fn attributes_do_not_resolve_variant_references_as_paths() {
	let attrs = parse_attributes(r##" file="#snippet""##, Path::new("/tmp/base"));
	assert_eq!(attrs.file(), Some("#snippet"));
	assert_eq!(attrs.file_path, None);
}

#[rstest]
#[case::missing_trigger("", "release", true)]
#[case::single_match(r#" trigger="release""#, "release", true)]
#[case::single_miss(r#" trigger="debug""#, "release", false)]
#[case::list_match(r#" trigger="dev, release""#, "release", true)]
#[case::list_miss(r#" trigger="dev,staging""#, "release", false)]
fn attributes_gate_on_the_active_trigger(
	#[case] attr_text: &str,
	#[case] active: &str,
	#[case] expected: bool,
) {
	let attrs = parse_attributes(attr_text, Path::new("/tmp"));
	assert_eq!(attrs.expands_under(active), expected);
}

#[rstest]
#[case::crlf("a\r\nb\r\n", "a\nb")]
#[case::trailing_whitespace("a  \t\nb", "a\nb")]
#[case::blank_run_collapse("a\n\n\n\nb", "a\n\nb")]
#[case::edge_blank_lines("\n\na\n\n", "a")]
fn normalize_cleans_whitespace(#[case] input: &str, #[case] expected: &str) {
	assert_eq!(text::normalize(input), expected);
}

#[rstest]
#[case::range("0123456789", "1,4", "123")]
#[case::open_end("0123456789", "7", "789")]
#[case::negative_start("0123456789", "-3", "789")]
#[case::negative_end("0123456789", "1,-1", "12345678")]
#[case::clamped("0123456789", "5,100", "56789")]
#[case::inverted("0123456789", "7,2", "")]
fn slice_follows_javascript_semantics(
	#[case] input: &str,
	#[case] spec: &str,
	#[case] expected: &str,
) {
	assert_eq!(text::slice_text(input, spec), expected);
}

#[test]
fn hash_content_is_md5_hex() {
	assert_eq!(text::hash_content(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
}

#[test]
fn include_splices_a_whole_file() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "lib.js", "LIB");
	let main = write_file(
		dir.path(),
		"main.js",
		"head\n<!--include file=\"lib.js\" -->\ntail\n",
	);
	assert_eq!(build_default(&main)?, "head\nLIB\ntail");

	Ok(())
}

#[test]
fn include_splices_a_block_from_the_same_file() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--tpl-->hello<!--/tpl-->\n<!--include block=\"tpl\" -->\n",
	);
	assert_eq!(
		build_default(&main)?,
		"<!--tpl-->hello<!--/tpl-->\nhello"
	);

	Ok(())
}

#[test]
fn include_splices_a_block_from_another_file() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "lib.js", "<!--util-->U1<!--/util-->\nrest\n");
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--include file=\"lib.js\" block=\"util\" -->\n",
	);
	assert_eq!(build_default(&main)?, "U1");

	Ok(())
}

#[test]
fn block_occurrences_concatenate_in_source_order() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--w--><!--part-->one<!--/part--><!--/w-->\n<!--part-->two<!--/part-->\n<!--include \
		 block=\"part\" -->\n",
	);
	assert_eq!(
		build_default(&main)?,
		"<!--w--><!--part-->one<!--/part--><!--/w-->\n<!--part-->two<!--/part-->\none\ntwo"
	);

	Ok(())
}

#[test]
fn inactive_trigger_keeps_markers_verbatim() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let source = "<!--extra trigger=\"dev\"-->X<!--/extra-->\n";
	let main = write_file(dir.path(), "main.js", source);

	assert_eq!(build_default(&main)?, source.trim_end());

	let options = BuildOptions {
		trigger: "dev".to_string(),
		..BuildOptions::default()
	};
	let expanded = BuildSession::new(options).build(&main)?;
	assert_eq!(expanded, "<!--extra trigger=\"dev\"-->X<!--/extra-->");

	Ok(())
}

#[test]
fn removal_ignores_the_trigger_state() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"keep\n<!--test trigger=\"dev\"-->gone<!--/test-->\n<!--debug-->gone<!--/debug-->\n",
	);
	assert_eq!(build_default(&main)?, "keep");

	Ok(())
}

#[test]
fn remove_tag_and_custom_remove_list() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--remove-->a<!--/remove-->\n<!--log-->b<!--/log-->\n<!--debug-->c<!--/debug-->\n",
	);

	let options = BuildOptions {
		remove: vec!["log".to_string()],
		..BuildOptions::default()
	};
	let output = BuildSession::new(options).build(&main)?;
	assert_eq!(output, "<!--debug-->c<!--/debug-->");

	Ok(())
}

#[test]
fn circular_block_references_fail() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--a--><!--include block=\"b\" --><!--/a-->\n<!--b--><!--include block=\"a\" \
		 --><!--/b-->\n<!--include block=\"a\" -->\n",
	);
	let error = build_default(&main).unwrap_err();
	assert!(matches!(error, JdistsError::CircularReference { .. }));
	assert!(error.to_string().contains("#a"));

	Ok(())
}

#[test]
fn self_referencing_block_fails() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--s--><!--include block=\"s\" --><!--/s-->\n<!--include block=\"s\" -->\n",
	);
	let error = build_default(&main).unwrap_err();
	assert!(matches!(error, JdistsError::CircularReference { .. }));

	Ok(())
}

#[test]
fn cross_file_circular_references_fail() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let a = write_file(
		dir.path(),
		"a.js",
		"<!--alpha--><!--include file=\"b.js\" block=\"beta\" --><!--/alpha-->\n",
	);
	let b = write_file(
		dir.path(),
		"b.js",
		"<!--beta--><!--include file=\"a.js\" block=\"alpha\" --><!--/beta-->\n",
	);

	let mut session = BuildSession::new(BuildOptions::default());
	let error = session.build(&a).unwrap_err();
	assert!(matches!(error, JdistsError::CircularReference { .. }));
	let chain = error.to_string();
	assert!(chain.contains("a.js#alpha"));
	assert!(chain.contains("b.js#beta"));
	let beta = BlockKey::new(&std::path::absolute(&b)?, "beta");
	assert!(session.block(&beta).is_some());

	Ok(())
}

#[test]
fn export_to_variant_and_import_back() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace export=\"#v\"-->VAL<!--/replace-->\n<!--include file=\"#v\" -->\n",
	);
	let mut session = BuildSession::new(BuildOptions::default());
	assert_eq!(session.build(&main)?, "VAL");
	assert_eq!(session.get_variant("#v"), Some("VAL"));

	Ok(())
}

#[test]
fn undefined_variant_reference_resolves_to_nothing() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(dir.path(), "main.js", "x<!--include file=\"#nope\" -->y\n");
	assert_eq!(build_default(&main)?, "xy");

	Ok(())
}

#[test]
fn build_discards_variants_from_earlier_builds() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(dir.path(), "main.js", "x<!--include file=\"#pre\" -->y\n");
	let mut session = BuildSession::new(BuildOptions::default());
	session.set_variant("#pre", "stale");
	assert_eq!(session.build(&main)?, "xy");
	assert_eq!(session.get_variant("#pre"), None);

	Ok(())
}

#[test]
fn export_to_file_creates_parent_directories() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace export=\"out/gen.txt\"-->DATA<!--/replace-->\n",
	);
	assert_eq!(build_default(&main)?, "");
	assert_eq!(std::fs::read_to_string(dir.path().join("out/gen.txt"))?, "DATA");

	Ok(())
}

#[test]
fn inactive_export_is_suppressed_entirely() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace trigger=\"never\" export=\"#q\"-->X<!--/replace-->\n",
	);
	let mut session = BuildSession::new(BuildOptions::default());
	assert_eq!(session.build(&main)?, "");
	assert_eq!(session.get_variant("#q"), None);

	Ok(())
}

#[test]
fn comment_typed_blocks_lose_their_outer_markers() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--doc type=\"comment\"--><!-- secret --><!--/doc-->\n<!--include block=\"doc\" -->\n",
	);
	let output = build_default(&main)?;
	assert!(output.ends_with("\n secret"), "got: {output:?}");

	Ok(())
}

#[test]
fn missing_include_file_resolves_to_nothing() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(dir.path(), "main.js", "a<!--include file=\"ghost.js\" -->b\n");
	assert_eq!(build_default(&main)?, "ab");

	Ok(())
}

#[test]
fn binary_files_are_included_through_base64() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "img.png", [0x89u8, 0x50, 0x4e, 0x47]);
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--include file=\"img.png\" encoding=\"base64\" -->\n",
	);
	assert_eq!(build_default(&main)?, "iVBORw==");

	Ok(())
}

#[rstest]
#[case::md5("md5", "abc", "900150983cd24fb0d6963f7d28e17f72")]
#[case::string("string", r#"he said "hi""#, r#""he said \"hi\"""#)]
#[case::html("html", "a & b", "a &amp; b")]
#[case::url("url", "a b&c", "a%20b%26c")]
#[case::escape("escape", "hi there,\u{fc}\u{2603}", "hi%20there%2C%FC%u2603")]
fn builtin_processors_transform_replace_bodies(
	#[case] encoding: &str,
	#[case] body: &str,
	#[case] expected: &str,
) -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		format!("<!--replace encoding=\"{encoding}\"-->{body}<!--/replace-->\n"),
	);
	assert_eq!(build_default(&main)?, expected);

	Ok(())
}

#[test]
fn slices_apply_after_content_resolution() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "nums.txt", "0123456789");
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--include file=\"nums.txt\" slice=\"1,4\" -->\n<!--include file=\"nums.txt\" \
		 slice=\"-3\" -->\n",
	);
	assert_eq!(build_default(&main)?, "123\n789");

	Ok(())
}

#[test]
fn jinja_renders_with_a_data_file() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "tpl.txt", "Hello {{ who }}!");
	write_file(dir.path(), "data.json", r#"{"who": "world"}"#);
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--include file=\"tpl.txt\" encoding=\"jinja\" data=\"data.json\" -->\n",
	);
	assert_eq!(build_default(&main)?, "Hello world!");

	Ok(())
}

#[test]
fn jinja_renders_with_variant_data() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "tpl.txt", "Hello {{ who }}!");
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace export=\"#ctx\"-->{\"who\": \"mars\"}<!--/replace-->\n<!--include \
		 file=\"tpl.txt\" encoding=\"jinja\" data=\"#ctx\" -->\n",
	);
	assert_eq!(build_default(&main)?, "Hello mars!");

	Ok(())
}

#[test]
fn jinja_reports_missing_data_sources() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "tpl.txt", "Hello {{ who }}!");
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--include file=\"tpl.txt\" encoding=\"jinja\" data=\"missing.json\" -->\n",
	);
	let error = build_default(&main).unwrap_err();
	assert!(matches!(error, JdistsError::TemplateData { .. }));

	Ok(())
}

#[test]
fn custom_processors_can_be_registered() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace encoding=\"upper\"-->abc<!--/replace-->\n",
	);
	fn upper(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
		Ok(ctx.content.text().to_uppercase())
	}

	let mut session = BuildSession::new(BuildOptions::default());
	session.register_encoding("upper", upper);
	assert_eq!(session.build(&main)?, "ABC");

	Ok(())
}

#[test]
fn processors_receive_resolved_content() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--part-->payload<!--/part-->\n<!--include encoding=\"stash\"-->x<!--/include-->\n<!--include file=\"#raw\" encoding=\"upper\" -->\n",
	);
	fn stash(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
		ctx.session
			.set_variant("#raw", "<!--include block=\"part\" -->");
		Ok(String::new())
	}
	fn upper(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
		Ok(ctx.content.text().to_uppercase())
	}

	// The variant holds unexpanded marker text; the processor must see the
	// spliced block content, not the marker itself.
	let mut session = BuildSession::new(BuildOptions::default());
	session.register_encoding("stash", stash);
	session.register_encoding("upper", upper);
	assert_eq!(
		session.build(&main)?,
		"<!--part-->payload<!--/part-->\n\nPAYLOAD"
	);

	Ok(())
}

#[test]
fn processor_errors_abort_the_build() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace encoding=\"boom\"-->abc<!--/replace-->\n",
	);
	fn boom(_ctx: ProcessorContext<'_>) -> JdistsResult<String> {
		Err(JdistsError::Processor {
			name: "boom".to_string(),
			reason: "always fails".to_string(),
		})
	}

	let mut session = BuildSession::new(BuildOptions::default());
	session.register_encoding("boom", boom);
	let error = session.build(&main).unwrap_err();
	assert!(matches!(error, JdistsError::Processor { .. }));

	Ok(())
}

#[test]
fn unknown_encodings_pass_content_through() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--replace encoding=\"nope\"-->abc<!--/replace-->\n",
	);
	assert_eq!(build_default(&main)?, "abc");

	Ok(())
}

#[test]
fn repeated_builds_are_deterministic() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "lib.js", "<!--util-->U<!--/util-->\n");
	let main = write_file(
		dir.path(),
		"main.js",
		"<!--include file=\"lib.js\" block=\"util\" -->\n<!--tpl-->x<!--/tpl-->\n",
	);
	let mut session = BuildSession::new(BuildOptions::default());
	let first = session.build(&main)?;
	let second = session.build(&main)?;
	assert_eq!(first, second);

	Ok(())
}

#[test]
fn clean_normalizes_and_no_clean_preserves() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let source = "a  \r\n\r\n\r\nb\t\n";
	let main = write_file(dir.path(), "main.js", source);

	assert_eq!(build_default(&main)?, "a\n\nb");

	let options = BuildOptions {
		clean: false,
		..BuildOptions::default()
	};
	assert_eq!(BuildSession::new(options).build(&main)?, source);

	Ok(())
}

#[test]
fn binary_detection_combines_extensions_and_predicate() {
	let mut options = BuildOptions::default();
	assert!(options.is_binary_path(Path::new("a/b.PNG")));
	assert!(!options.is_binary_path(Path::new("a/b.wasm")));

	options.binary_extensions.push("wasm".to_string());
	assert!(options.is_binary_path(Path::new("a/b.wasm")));

	options.is_binary = Some(std::rc::Rc::new(|path: &Path| {
		path.to_string_lossy().contains("blob")
	}));
	assert!(options.is_binary_path(Path::new("data/blob.txt")));
}

#[test]
fn config_file_overrides_build_options() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(
		dir.path(),
		"jdists.toml",
		"[build]\ntrigger = \"dev\"\nremove = \"log, trace\"\nclean = false\nbinary_extensions = \
		 [\"wasm\"]\n",
	);

	let config = JdistsConfig::load(dir.path())?.ok_or("expected a config file")?;
	let mut options = BuildOptions::default();
	config.apply(&mut options);

	assert_eq!(options.trigger, "dev");
	assert_eq!(options.remove, vec!["log".to_string(), "trace".to_string()]);
	assert!(!options.clean);
	assert_eq!(options.binary_extensions, vec!["wasm".to_string()]);

	Ok(())
}

#[test]
fn malformed_config_files_fail_loudly() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	write_file(dir.path(), "jdists.toml", "[build\ntrigger = ");

	let error = JdistsConfig::load(dir.path()).unwrap_err();
	assert!(matches!(error, JdistsError::ConfigParse(_)));

	Ok(())
}

#[test]
fn missing_config_is_not_an_error() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	assert!(JdistsConfig::load(dir.path())?.is_none());

	Ok(())
}
