// 该文件是 Kanjian （看见） 项目的一部分。
// src/listener.rs - 结果事件监听者注册表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{observation::ResultBatch, request::RequestKind};

pub type Listener = Arc<dyn Fn(&ResultBatch) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Listeners {
  next_id: u64,
  entries: BTreeMap<ListenerId, (RequestKind, Listener)>,
}

impl fmt::Debug for Listeners {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map()
      .entries(self.entries.iter().map(|(id, (kind, _))| (id, kind)))
      .finish()
  }
}

impl Listeners {
  pub fn add<F>(&mut self, kind: RequestKind, listener: F) -> ListenerId
  where
    F: Fn(&ResultBatch) + Send + Sync + 'static,
  {
    self.next_id += 1;
    let id = ListenerId(self.next_id);
    self.entries.insert(id, (kind, Arc::new(listener)));
    id
  }

  pub fn remove(&mut self, id: ListenerId) -> bool {
    self.entries.remove(&id).is_some()
  }

  pub fn count(&self, kind: RequestKind) -> usize {
    self.entries.values().filter(|(k, _)| *k == kind).count()
  }

  pub fn has_listeners(&self, kind: RequestKind) -> bool {
    self.entries.values().any(|(k, _)| *k == kind)
  }

  /// 按注册顺序取出监听者的快照
  pub fn snapshot(&self, kind: RequestKind) -> Vec<Listener> {
    self
      .entries
      .values()
      .filter(|(k, _)| *k == kind)
      .map(|(_, listener)| Arc::clone(listener))
      .collect()
  }

  /// 把批次分发给同类监听者，返回收到事件的监听者数量
  pub fn emit(&self, batch: &ResultBatch) -> usize {
    let snapshot = self.snapshot(batch.kind());
    for listener in snapshot.iter() {
      listener(batch);
    }
    snapshot.len()
  }
}
