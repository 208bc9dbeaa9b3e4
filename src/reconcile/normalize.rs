//! Derivation of the session directory name Claude Code uses for a project.
//!
//! The mapping is lossy: `/a_b` and `/a/b` both become `-a-b`. Nothing here
//! tries to invert it; original paths are recovered from the history log or
//! the config dictionary.

const REPLACEMENT: char = '-';

fn is_replaced(ch: char) -> bool {
    ch == '/'
        || ch == std::path::MAIN_SEPARATOR
        || ch == '.'
        || ch == ' '
        || ch == '_'
        || !(ch.is_ascii_graphic() || ch == ' ')
}

pub fn normalize(path: &str) -> String {
    path.chars()
        .map(|ch| if is_replaced(ch) { REPLACEMENT } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::normalize;

    #[test]
    fn separators_dots_spaces_and_underscores_become_dashes() {
        let cases = [
            ("/Users/test/My Project", "-Users-test-My-Project"),
            ("/Users/test/Documents", "-Users-test-Documents"),
            ("/Users/test/file.txt", "-Users-test-file-txt"),
            ("/Users/test/2 Projects", "-Users-test-2-Projects"),
            ("/Users/test/my_project", "-Users-test-my-project"),
        ];
        for (input, want) in cases {
            assert_eq!(normalize(input), want, "input {input}");
        }
    }

    #[test]
    fn non_ascii_characters_become_one_dash_each() {
        assert_eq!(normalize("/Users/test/naïve"), "-Users-test-na-ve");
        assert_eq!(normalize("/Users/test/résumé"), "-Users-test-r-sum-");
    }

    #[test]
    fn control_characters_are_replaced() {
        assert_eq!(normalize("/a\tb\u{7f}"), "-a-b-");
    }

    #[test]
    fn other_printable_ascii_is_kept() {
        assert_eq!(normalize("/srv/c++/a-b@v2"), "-srv-c++-a-b@v2");
    }

    #[test]
    fn runs_are_not_collapsed() {
        assert_eq!(
            normalize("/path/with  multiple   spaces"),
            "-path-with--multiple---spaces"
        );
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn distinct_paths_can_collide() {
        assert_eq!(normalize("/a_b"), normalize("/a/b"));
    }
}
