use mapper_protocol::{Bucket, FileRecord, PlannedFile};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Greedy next-fit packing, module by module.
///
/// Modules are visited by descending token total (ties by module id), records within a module by
/// path. A record larger than `max_tokens` always gets a bucket of its own.
pub fn pack(records: &[&FileRecord], max_tokens: u64) -> Vec<Bucket> {
    let mut by_module: BTreeMap<&str, Vec<&FileRecord>> = BTreeMap::new();
    for &record in records {
        by_module.entry(record.module.as_str()).or_default().push(record);
    }

    let mut modules: Vec<(&str, u64, Vec<&FileRecord>)> = by_module
        .into_iter()
        .map(|(module, mut members)| {
            members.sort_by(|a, b| a.path.cmp(&b.path));
            let total = members.iter().map(|r| r.tokens).sum();
            (module, total, members)
        })
        .collect();
    modules.sort_by_key(|(module, total, _)| (Reverse(*total), *module));

    let mut packer = Packer::new(max_tokens);
    for (_, _, members) in modules {
        for record in members {
            packer.push(record);
        }
    }
    packer.finish()
}

struct Packer {
    max_tokens: u64,
    done: Vec<Bucket>,
    open: Vec<PlannedFile>,
    open_tokens: u64,
}

impl Packer {
    fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            done: Vec::new(),
            open: Vec::new(),
            open_tokens: 0,
        }
    }

    fn push(&mut self, record: &FileRecord) {
        let planned = PlannedFile {
            path: record.path.clone(),
            tokens: record.tokens,
            module: record.module.clone(),
            flag: record.flag,
        };

        if record.tokens > self.max_tokens {
            self.close();
            self.emit(vec![planned], record.tokens, true);
            return;
        }

        if !self.open.is_empty() && self.open_tokens.saturating_add(record.tokens) > self.max_tokens
        {
            self.close();
        }
        self.open_tokens = self.open_tokens.saturating_add(record.tokens);
        self.open.push(planned);
    }

    fn close(&mut self) {
        if self.open.is_empty() {
            return;
        }
        let files = std::mem::take(&mut self.open);
        let tokens = std::mem::take(&mut self.open_tokens);
        self.emit(files, tokens, false);
    }

    fn emit(&mut self, files: Vec<PlannedFile>, tokens: u64, oversized: bool) {
        let mut modules: Vec<String> = Vec::new();
        for file in &files {
            if !modules.contains(&file.module) {
                modules.push(file.module.clone());
            }
        }
        self.done.push(Bucket {
            id: self.done.len() + 1,
            tokens,
            oversized,
            modules,
            files,
        });
    }

    fn finish(mut self) -> Vec<Bucket> {
        self.close();
        self.done
    }
}
