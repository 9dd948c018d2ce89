//! `source:destination` argument handling.

/// Split a `source:destination` argument.
///
/// An argument with exactly one `:` is split in two. Otherwise the whole
/// argument is the source and the destination is the same path with forward
/// slashes.
pub fn split_destination(arg: &str) -> (String, String) {
    let parts: Vec<&str> = arg.split(':').collect();
    match parts.as_slice() {
        [source, destination] => (source.to_string(), destination.to_string()),
        _ => (arg.to_string(), arg.replace('\\', "/")),
    }
}

/// Name of the bytecode file `node.compile` produces for `path`.
pub fn compiled_name(path: &str) -> String {
    let stem = path.rsplit_once('.').map_or(path, |(stem, _)| stem);
    format!("{}.lc", stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_destination() {
        assert_eq!(
            split_destination("src/init.lua:init.lua"),
            ("src/init.lua".to_string(), "init.lua".to_string())
        );
        assert_eq!(
            split_destination("lib\\util.lua"),
            ("lib\\util.lua".to_string(), "lib/util.lua".to_string())
        );
        assert_eq!(
            split_destination("a:b:c"),
            ("a:b:c".to_string(), "a:b:c".to_string())
        );
    }

    #[test]
    fn test_compiled_name() {
        assert_eq!(compiled_name("app.lua"), "app.lc");
        assert_eq!(compiled_name("app"), "app.lc");
    }
}
