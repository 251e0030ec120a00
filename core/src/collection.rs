//! One page of a list response.
//!
//! A `Collection` never fetches further pages on its own. To continue,
//! issue the list call again with `page` set to `current_page() + 1`.

use std::ops::Deref;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Collection<R> {
    entries: Vec<R>,
    current_page: u64,
    page_size: u64,
    total_entries: u64,
    total_pages: u64,
    paginated: bool,
}

impl<R> Collection<R> {
    /// A page with server-supplied metadata.
    pub fn new(current_page: u64, page_size: u64, total_entries: u64) -> Self {
        Self {
            entries: Vec::new(),
            current_page,
            page_size,
            total_entries,
            total_pages: total_pages(page_size, total_entries),
            paginated: true,
        }
    }

    /// A list response that carried no page metadata.
    pub fn unpaged(entries: Vec<R>) -> Self {
        let total_entries = entries.len() as u64;
        Self {
            entries,
            current_page: 1,
            page_size: 0,
            total_entries,
            total_pages: 1,
            paginated: false,
        }
    }

    pub(crate) fn push(&mut self, entry: R) {
        self.entries.push(entry);
        if !self.paginated {
            self.total_entries = self.entries.len() as u64;
        }
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_entries(&self) -> u64 {
        self.total_entries
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    /// Whether the response carried page metadata.
    pub fn is_paginated(&self) -> bool {
        self.paginated
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn find(&self, mut predicate: impl FnMut(&R) -> bool) -> Option<&R> {
        self.entries.iter().find(|entry| predicate(entry))
    }

    pub fn into_vec(self) -> Vec<R> {
        self.entries
    }
}

fn total_pages(page_size: u64, total_entries: u64) -> u64 {
    if page_size == 0 {
        return 1;
    }
    total_entries.div_ceil(page_size)
}

impl<R> Deref for Collection<R> {
    type Target = [R];

    fn deref(&self) -> &[R] {
        &self.entries
    }
}

impl<R> IntoIterator for Collection<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a Collection<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
