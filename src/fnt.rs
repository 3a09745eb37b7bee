//! FNT - the nested folder/file name tree shared by ROM images and NARC
//! archives.
//!
//! ## Wire layout
//! ```text
//! Directory table (8 bytes per folder, indexed 0..folderCount):
//!   root (index 0):     [u32 entryTableOffset][u16 firstFileID][u16 folderCount]
//!   non-root (index i): [u32 entryTableOffset][u16 firstFileID][u16 parentDirID]
//!
//! Entry table (one run per folder, at that folder's entryTableOffset):
//!   0x01..=0x7F length byte -> file entry:   [name bytes (length)]
//!   0x81..=0xFF length byte -> folder entry: [name bytes (length-0x80)][u16 subDirID]
//!   0x00                    -> end of this folder's entries
//! ```
//!
//! A folder's directory ID is `0xF000 | index`; only the low 12 bits are a
//! real table index, which caps the tree at 4096 folders. File IDs are not
//! stored per file - a folder's `firstFileID` plus the count of file entries
//! seen so far (subfolder entries don't advance the counter) gives each
//! file's ID, in entry-table order.

use crate::cursor::Reader;
use crate::error::{Context, Error, Result};
use std::collections::{HashMap, VecDeque};

const ROOT_DIR_ID: u16 = 0xF000;
const MAX_FOLDERS: usize = 4096;

/// One folder in the tree: an explicit `first_id` plus two independently
/// ordered lists (files, then named subfolders).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub first_id: u16,
    pub files: Vec<String>,
    pub subfolders: Vec<(String, Folder)>,
}

impl Folder {
    fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// A parsed filename table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fnt {
    pub root: Folder,
}

struct RawDir {
    entry_table_offset: usize,
    first_id: u16,
}

impl Fnt {
    /// Parse an FNT blob.
    pub fn parse(data: &[u8]) -> Result<Fnt> {
        let mut r = Reader::new(data, true);
        let root_offset = r.read_u32().map_err(|_| oob(0))? as usize;
        let root_first_id = r.read_u16().map_err(|_| oob(4))?;
        let folder_count = r.read_u16().map_err(|_| oob(6))? as usize;
        if folder_count == 0 || folder_count > MAX_FOLDERS {
            return Err(Error::MalformedFnt(Context::new(6, "folder count out of range")));
        }

        let mut dirs = Vec::with_capacity(folder_count);
        dirs.push(RawDir {
            entry_table_offset: root_offset,
            first_id: root_first_id,
        });
        for i in 1..folder_count {
            let pos = i * 8;
            let entry_table_offset = r.read_u32().map_err(|_| oob(pos))? as usize;
            let first_id = r.read_u16().map_err(|_| oob(pos + 4))?;
            let _parent_dir_id = r.read_u16().map_err(|_| oob(pos + 6))?;
            dirs.push(RawDir {
                entry_table_offset,
                first_id,
            });
        }

        let mut claimed = vec![false; folder_count];
        claimed[0] = true;
        let root = build_folder(0, &dirs, data, &mut claimed)?;

        let fnt = Fnt { root };
        fnt.check_file_id_contiguity()?;
        Ok(fnt)
    }

    /// Serialize the tree back to an FNT blob.
    ///
    /// Folder directory indices are assigned by a breadth-first walk
    /// starting at the root (root gets index 0); this need not match the
    /// index assignment of whatever produced the tree originally, but is
    /// internally consistent and round-trips through [`Fnt::parse`].
    pub fn emit(&self) -> Result<Vec<u8>> {
        self.check_file_id_contiguity()?;

        let mut order: Vec<&Folder> = Vec::new();
        let mut parent_of: Vec<usize> = Vec::new();
        let mut queue: VecDeque<(&Folder, usize)> = VecDeque::new();
        queue.push_back((&self.root, 0));
        while let Some((folder, parent)) = queue.pop_front() {
            let idx = order.len();
            order.push(folder);
            parent_of.push(parent);
            for (_, sub) in &folder.subfolders {
                queue.push_back((sub, idx));
            }
        }

        let folder_count = order.len();
        if folder_count > MAX_FOLDERS {
            return Err(Error::PreconditionFailed(
                "tree has more than 4096 folders, which a 12-bit directory index cannot address",
            ));
        }

        let mut index_of: HashMap<*const Folder, usize> = HashMap::new();
        for (i, f) in order.iter().enumerate() {
            index_of.insert(*f as *const Folder, i);
        }

        let mut entry_bytes: Vec<Vec<u8>> = Vec::with_capacity(folder_count);
        for folder in &order {
            let mut buf = Vec::new();
            for name in &folder.files {
                let len = name.len();
                if len == 0 || len > 0x7F {
                    return Err(Error::PreconditionFailed(
                        "file name must be 1..=127 bytes",
                    ));
                }
                buf.push(len as u8);
                buf.extend_from_slice(name.as_bytes());
            }
            for (name, sub) in &folder.subfolders {
                let len = name.len();
                if len == 0 || len > 0x7F {
                    return Err(Error::PreconditionFailed(
                        "subfolder name must be 1..=127 bytes",
                    ));
                }
                buf.push(0x80 | len as u8);
                buf.extend_from_slice(name.as_bytes());
                let sub_idx = *index_of
                    .get(&(sub as *const Folder))
                    .expect("every subfolder was visited during the BFS walk");
                let sub_id = ROOT_DIR_ID | sub_idx as u16;
                buf.extend_from_slice(&sub_id.to_le_bytes());
            }
            buf.push(0x00);
            entry_bytes.push(buf);
        }

        let dir_table_len = 8 * folder_count;
        let mut offsets = Vec::with_capacity(folder_count);
        let mut pos = dir_table_len;
        for buf in &entry_bytes {
            offsets.push(pos);
            pos += buf.len();
        }

        let mut out = Vec::with_capacity(pos);
        for i in 0..folder_count {
            out.extend_from_slice(&(offsets[i] as u32).to_le_bytes());
            out.extend_from_slice(&order[i].first_id.to_le_bytes());
            if i == 0 {
                out.extend_from_slice(&(folder_count as u16).to_le_bytes());
            } else {
                let parent_id = ROOT_DIR_ID | parent_of[i] as u16;
                out.extend_from_slice(&parent_id.to_le_bytes());
            }
        }
        for buf in &entry_bytes {
            out.extend_from_slice(buf);
        }
        Ok(out)
    }

    /// Resolve a `/`-separated path to a file ID.
    pub fn id_of(&self, path: &str) -> Option<u16> {
        let mut folder = &self.root;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                return folder
                    .files
                    .iter()
                    .position(|f| f == component)
                    .map(|i| folder.first_id + i as u16);
            }
            folder = &folder.subfolders.iter().find(|(name, _)| name == component)?.1;
        }
        None
    }

    /// Resolve a file ID back to its full `/`-separated path.
    pub fn name_of(&self, id: u16) -> Option<String> {
        fn walk(folder: &Folder, id: u16, prefix: &str) -> Option<String> {
            if id >= folder.first_id && ((id - folder.first_id) as usize) < folder.file_count() {
                let name = &folder.files[(id - folder.first_id) as usize];
                return Some(format!("{prefix}{name}"));
            }
            for (name, sub) in &folder.subfolders {
                if let Some(found) = walk(sub, id, &format!("{prefix}{name}/")) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.root, id, "")
    }

    fn check_file_id_contiguity(&self) -> Result<()> {
        let mut ranges: Vec<(u16, usize)> = Vec::new();
        collect_ranges(&self.root, &mut ranges);
        ranges.sort_by_key(|(start, _)| *start);
        let mut expected = 0u32;
        for (start, count) in ranges {
            if start as u32 != expected {
                return Err(Error::PreconditionFailed(
                    "file IDs across the tree are not a dense contiguous range starting at 0",
                ));
            }
            expected += count as u32;
        }
        Ok(())
    }
}

fn collect_ranges(folder: &Folder, out: &mut Vec<(u16, usize)>) {
    if folder.file_count() > 0 {
        out.push((folder.first_id, folder.file_count()));
    }
    for (_, sub) in &folder.subfolders {
        collect_ranges(sub, out);
    }
}

fn build_folder(idx: usize, dirs: &[RawDir], data: &[u8], claimed: &mut [bool]) -> Result<Folder> {
    let dir = &dirs[idx];
    let mut pos = dir.entry_table_offset;
    let mut files = Vec::new();
    let mut subfolders = Vec::new();

    loop {
        let len = *data.get(pos).ok_or_else(|| oob(pos))?;
        pos += 1;
        if len == 0x00 {
            break;
        }
        if len <= 0x7F {
            let name = read_name(data, pos, len as usize)?;
            pos += len as usize;
            files.push(name);
        } else {
            let name_len = (len & 0x7F) as usize;
            let name = read_name(data, pos, name_len)?;
            pos += name_len;
            let raw = data.get(pos..pos + 2).ok_or_else(|| oob(pos))?;
            pos += 2;
            let sub_id = u16::from_le_bytes([raw[0], raw[1]]);
            let sub_idx = (sub_id & 0x0FFF) as usize;
            if sub_idx == 0 || sub_idx >= dirs.len() {
                return Err(Error::MalformedFnt(Context::new(
                    pos,
                    "subfolder directory index out of range",
                )));
            }
            if claimed[sub_idx] {
                return Err(Error::MalformedFnt(Context::new(
                    pos,
                    "subfolder directory index referenced more than once",
                )));
            }
            claimed[sub_idx] = true;
            let sub = build_folder(sub_idx, dirs, data, claimed)?;
            subfolders.push((name, sub));
        }
    }

    Ok(Folder {
        first_id: dir.first_id,
        files,
        subfolders,
    })
}

fn read_name(data: &[u8], pos: usize, len: usize) -> Result<String> {
    let bytes = data.get(pos..pos + len).ok_or_else(|| oob(pos))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn oob(pos: usize) -> Error {
    Error::OutOfBounds { pos }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Fnt {
        Fnt {
            root: Folder {
                first_id: 0,
                files: vec!["readme.txt".into(), "icon.bin".into()],
                subfolders: vec![(
                    "data".into(),
                    Folder {
                        first_id: 2,
                        files: vec!["a.bin".into(), "b.bin".into(), "c.bin".into()],
                        subfolders: vec![(
                            "sub".into(),
                            Folder {
                                first_id: 5,
                                files: vec!["d.bin".into()],
                                subfolders: vec![],
                            },
                        )],
                    },
                )],
            },
        }
    }

    #[test]
    fn roundtrip_nested_tree() {
        let fnt = sample();
        let bytes = fnt.emit().unwrap();
        let parsed = Fnt::parse(&bytes).unwrap();
        assert_eq!(parsed, fnt);
    }

    #[test]
    fn id_and_name_lookup_agree() {
        let fnt = sample();
        assert_eq!(fnt.id_of("readme.txt"), Some(0));
        assert_eq!(fnt.id_of("data/b.bin"), Some(3));
        assert_eq!(fnt.id_of("data/sub/d.bin"), Some(5));
        assert_eq!(fnt.id_of("nope"), None);

        for id in 0..=5u16 {
            let path = fnt.name_of(id).unwrap();
            assert_eq!(fnt.id_of(&path), Some(id));
        }
    }

    #[test]
    fn rejects_gap_in_file_ids() {
        let fnt = Fnt {
            root: Folder {
                first_id: 0,
                files: vec!["a".into()],
                subfolders: vec![(
                    "x".into(),
                    Folder {
                        first_id: 5,
                        files: vec!["b".into()],
                        subfolders: vec![],
                    },
                )],
            },
        };
        assert!(matches!(
            fnt.emit(),
            Err(Error::PreconditionFailed(_))
        ));
    }

    #[test]
    fn rejects_subfolder_referenced_twice() {
        // Two folders both pointing at directory index 1 (shared, not a tree).
        let mut bytes = Vec::new();
        // dir table: root (idx0, folderCount=2), idx1
        bytes.extend_from_slice(&16u32.to_le_bytes()); // root entry table offset
        bytes.extend_from_slice(&0u16.to_le_bytes()); // first id
        bytes.extend_from_slice(&2u16.to_le_bytes()); // folder count
        bytes.extend_from_slice(&0u32.to_le_bytes()); // idx1 entry table offset (filled below)
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0xF000u16.to_le_bytes());
        let idx1_offset = bytes.len() as u32;
        bytes[16..20].copy_from_slice(&idx1_offset.to_le_bytes());
        // idx1 entries: just a terminator
        bytes.push(0x00);
        // root entries: two subfolder entries both pointing at dir id 0xF001
        let root_entries_offset = bytes.len() as u32;
        bytes[0..4].copy_from_slice(&root_entries_offset.to_le_bytes());
        bytes.push(0x80 | 1);
        bytes.push(b'a');
        bytes.extend_from_slice(&0xF001u16.to_le_bytes());
        bytes.push(0x80 | 1);
        bytes.push(b'b');
        bytes.extend_from_slice(&0xF001u16.to_le_bytes());
        bytes.push(0x00);

        assert!(matches!(Fnt::parse(&bytes), Err(Error::MalformedFnt(_))));
    }
}
