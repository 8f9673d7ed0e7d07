use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use yaml_rust2::{Yaml, YamlLoader};

const INCLUDE_DIRECTIVE: &str = "!include";

/// Loads a YAML file, resolving `!include <relative path>` lines first.
///
/// Included documents are merged in order, then the including file's own
/// keys are merged on top, so local values override included ones.
pub fn load_yaml_with_includes(path: &Path) -> Result<Yaml, Box<dyn Error>> {
    process_includes_recursive(&path.to_path_buf(), &mut Vec::new())
}

fn process_includes_recursive(path: &PathBuf, stack: &mut Vec<PathBuf>) -> Result<Yaml, Box<dyn Error>> {
    if stack.contains(path) {
        return Err(format!("Include cycle detected at {}", path.display()).into());
    }
    stack.push(path.clone());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let base_path = path.parent().unwrap_or(Path::new(""));

    let (includes, rest): (Vec<&str>, Vec<&str>) = contents
        .lines()
        .partition(|&line| line.trim().starts_with(INCLUDE_DIRECTIVE));

    let mut merged_includes: Option<Yaml> = None;
    for line in includes {
        let include_path = line.trim().trim_start_matches(INCLUDE_DIRECTIVE).trim();
        let included = process_includes_recursive(&base_path.join(include_path), stack)
            .map_err(|e| format!("Failed to process include {}: {}", include_path, e))?;
        merged_includes = Some(match merged_includes {
            Some(acc) => merge_yaml(&acc, &included),
            None => included,
        });
    }

    let merged_rest = YamlLoader::load_from_str(&rest.join("\n"))?
        .into_iter()
        .reduce(|acc, doc| merge_yaml(&acc, &doc))
        .unwrap_or(Yaml::Hash(Default::default()));

    stack.pop();

    Ok(match merged_includes {
        Some(base) => merge_yaml(&base, &merged_rest),
        None => merged_rest,
    })
}

fn merge_yaml(base: &Yaml, override_yaml: &Yaml) -> Yaml {
    match (base, override_yaml) {
        (Yaml::Hash(base_hash), Yaml::Hash(override_hash)) => {
            let mut result = base_hash.clone();
            for (key, value) in override_hash {
                let merged = match base_hash.get(key) {
                    Some(base_value) => merge_yaml(base_value, value),
                    None => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Yaml::Hash(result)
        }
        (base_value, Yaml::Null | Yaml::BadValue) => base_value.clone(),
        (_, override_value) => override_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::generate_unique_id;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(generate_unique_id("yaml-include"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_local_keys_override_included_ones() {
        let dir = scratch_dir();
        fs::write(
            dir.join("base.yaml"),
            "backend:\n  server_address: 0.0.0.0:5000\n  log_level: info\n",
        )
        .unwrap();
        fs::write(
            dir.join("dev.yaml"),
            "!include base.yaml\nbackend:\n  log_level: debug\n",
        )
        .unwrap();

        let yaml = load_yaml_with_includes(&dir.join("dev.yaml")).unwrap();
        assert_eq!(yaml["backend"]["log_level"].as_str(), Some("debug"));
        assert_eq!(yaml["backend"]["server_address"].as_str(), Some("0.0.0.0:5000"));
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let dir = scratch_dir();
        fs::write(dir.join("a.yaml"), "!include b.yaml\na: 1\n").unwrap();
        fs::write(dir.join("b.yaml"), "!include a.yaml\nb: 2\n").unwrap();

        assert!(load_yaml_with_includes(&dir.join("a.yaml")).is_err());
    }

    #[test]
    fn test_missing_include_is_an_error() {
        let dir = scratch_dir();
        fs::write(dir.join("main.yaml"), "!include nowhere.yaml\n").unwrap();

        assert!(load_yaml_with_includes(&dir.join("main.yaml")).is_err());
    }
}
