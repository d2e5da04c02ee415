//! 单层目录快照

use super::file::File;
use std::collections::HashMap;

/// 单层目录快照，所有构建方法都返回新值
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    file: File,
    /// 列举顺序
    children: Vec<File>,
    index: HashMap<String, usize>,
    duplicate: Vec<File>,
}

impl Folder {
    pub fn new(file: File) -> Self {
        Self {
            file,
            children: Vec::new(),
            index: HashMap::new(),
            duplicate: Vec::new(),
        }
    }

    /// 从列举结果构建快照，重名条目放入 `duplicate`
    pub fn from_listing(file: File, entries: impl IntoIterator<Item = File>) -> Self {
        let mut folder = Self::new(file);
        for entry in entries {
            folder.add_child(entry);
        }
        folder
    }

    fn add_child(&mut self, child: File) {
        let name = child.name();
        if self.index.contains_key(&name) {
            self.duplicate.push(child);
        } else {
            self.index.insert(name, self.children.len());
            self.children.push(child);
        }
    }

    fn rebuild(file: File, children: Vec<File>, duplicate: Vec<File>) -> Self {
        let index = children
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name(), i))
            .collect();
        Self {
            file,
            children,
            index,
            duplicate,
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn children(&self) -> &[File] {
        &self.children
    }

    pub fn duplicate(&self) -> &[File] {
        &self.duplicate
    }

    pub fn child(&self, name: &str) -> Option<&File> {
        self.index.get(name).map(|&i| &self.children[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// 按列举顺序返回子目录
    pub fn folders(&self) -> impl Iterator<Item = &File> {
        self.children.iter().filter(|c| c.folder())
    }

    /// 添加 `child` 后的新快照，重名时放入 `duplicate`
    pub fn with_child(&self, child: File) -> Self {
        let mut folder = self.clone();
        folder.add_child(child);
        folder
    }

    /// 替换（或添加）同名子条目后的新快照
    pub fn with_child_replaced(&self, child: File) -> Self {
        let mut folder = self.clone();
        match folder.index.get(&child.name()) {
            Some(&i) => folder.children[i] = child,
            None => folder.add_child(child),
        }
        folder
    }

    /// 仅保留满足 `keep` 的子条目
    pub fn with_children_where(&self, keep: impl Fn(&File) -> bool) -> Self {
        let children = self.children.iter().filter(|c| keep(c)).cloned().collect();
        Self::rebuild(self.file.clone(), children, self.duplicate.clone())
    }

    /// 相同 `file`，没有子条目和重复条目
    pub fn without_children(&self) -> Self {
        Self::new(self.file.clone())
    }

    /// 相同 `file` 和子条目，没有重复条目
    pub fn without_duplicate(&self) -> Self {
        Self::rebuild(self.file.clone(), self.children.clone(), Vec::new())
    }
}
