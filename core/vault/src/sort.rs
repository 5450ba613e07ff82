//! Display-time ordering of directory listings.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tree::TreeNode;
use lifechest_common::Error;

/// Sort preference persisted in the vault config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMethod {
    ImportDate,
    ImportDateReverse,
    Size,
    SizeReverse,
    #[default]
    Name,
    NameReverse,
    Random,
}

impl SortMethod {
    /// Every method, in display order.
    pub const ALL: [SortMethod; 7] = [
        SortMethod::ImportDate,
        SortMethod::ImportDateReverse,
        SortMethod::Size,
        SortMethod::SizeReverse,
        SortMethod::Name,
        SortMethod::NameReverse,
        SortMethod::Random,
    ];

    /// Return the items in display order.
    ///
    /// The stored child order is never touched.
    pub fn sort_items<'a>(&self, items: &'a [TreeNode]) -> Vec<&'a TreeNode> {
        let mut sorted: Vec<&TreeNode> = items.iter().collect();
        match self {
            SortMethod::ImportDate => sorted.sort_by_key(|node| node.import_date()),
            SortMethod::ImportDateReverse => {
                sorted.sort_by_key(|node| std::cmp::Reverse(node.import_date()))
            }
            SortMethod::Size => sorted.sort_by_key(|node| node.size()),
            SortMethod::SizeReverse => sorted.sort_by_key(|node| std::cmp::Reverse(node.size())),
            SortMethod::Name => sorted.sort_by(|a, b| a.name().cmp(b.name())),
            SortMethod::NameReverse => sorted.sort_by(|a, b| b.name().cmp(a.name())),
            SortMethod::Random => sorted.shuffle(&mut rand::thread_rng()),
        }
        sorted
    }

    fn as_str(&self) -> &'static str {
        match self {
            SortMethod::ImportDate => "ImportDate",
            SortMethod::ImportDateReverse => "ImportDateReverse",
            SortMethod::Size => "Size",
            SortMethod::SizeReverse => "SizeReverse",
            SortMethod::Name => "Name",
            SortMethod::NameReverse => "NameReverse",
            SortMethod::Random => "Random",
        }
    }
}

impl fmt::Display for SortMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown sort method: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DirectoryNode;
    use chrono::{Duration, Utc};

    fn items() -> Vec<TreeNode> {
        let now = Utc::now();
        ["b", "c", "a"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let mut dir = DirectoryNode::new(name);
                dir.import_date = now + Duration::seconds(i as i64);
                TreeNode::Directory(dir)
            })
            .collect()
    }

    fn names(sorted: &[&TreeNode]) -> Vec<String> {
        sorted.iter().map(|n| n.name().to_string()).collect()
    }

    #[test]
    fn test_sort_by_name() {
        let items = items();
        assert_eq!(names(&SortMethod::Name.sort_items(&items)), ["a", "b", "c"]);
        assert_eq!(
            names(&SortMethod::NameReverse.sort_items(&items)),
            ["c", "b", "a"]
        );
    }

    #[test]
    fn test_sort_by_import_date() {
        let items = items();
        assert_eq!(
            names(&SortMethod::ImportDate.sort_items(&items)),
            ["b", "c", "a"]
        );
        assert_eq!(
            names(&SortMethod::ImportDateReverse.sort_items(&items)),
            ["a", "c", "b"]
        );
    }

    #[test]
    fn test_random_keeps_items() {
        let items = items();
        let mut shuffled = names(&SortMethod::Random.sort_items(&items));
        shuffled.sort();
        assert_eq!(shuffled, ["a", "b", "c"]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("size".parse::<SortMethod>().unwrap(), SortMethod::Size);
        assert_eq!(
            "NameReverse".parse::<SortMethod>().unwrap(),
            SortMethod::NameReverse
        );
        assert!("bogus".parse::<SortMethod>().is_err());
    }
}
