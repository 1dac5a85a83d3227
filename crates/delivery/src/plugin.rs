/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The plugin contract. Plugins register hooks during `init` through the
//! registrar; a failed init rolls every registration back, and unloads
//! are deferred until no invocation is in flight.

use crate::{
    Pipeline,
    hooks::{HookEntry, HookFn},
};
use std::sync::Arc;
use tracing::{info, warn};

pub trait HookPlugin: Send + Sync {
    fn name(&self) -> &str;
    /// Return `false` on any setup error; the plugin is then rejected
    /// and its registrations undone.
    fn init(&self, registrar: &mut PluginRegistrar<'_>) -> bool;
    fn free(&self) {}
    fn thread_create(&self) {}
    fn thread_destroy(&self) {}
}

/// Handed to a plugin during init; records every capability the plugin
/// takes so they can be released on unload.
pub struct PluginRegistrar<'a> {
    pipeline: &'a Pipeline,
    plugin_index: usize,
    pub(crate) hooks: Vec<Arc<HookEntry>>,
    pub(crate) registered_local: bool,
    pub(crate) talk: Option<TalkFn>,
}

impl<'a> PluginRegistrar<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, plugin_index: usize) -> Self {
        PluginRegistrar {
            pipeline,
            plugin_index,
            hooks: Vec::new(),
            registered_local: false,
            talk: None,
        }
    }

    pub fn register_hook(&mut self, func: HookFn) -> bool {
        match self
            .pipeline
            .registry()
            .register(func, Some(self.plugin_index))
        {
            Some(entry) => {
                self.hooks.push(entry);
                true
            }
            None => false,
        }
    }

    pub fn register_local(&mut self, func: HookFn) -> bool {
        match self
            .pipeline
            .registry()
            .register_local(func, Some(self.plugin_index))
        {
            Some(entry) => {
                self.hooks.push(entry);
                self.registered_local = true;
                true
            }
            None => false,
        }
    }

    pub fn get_host_id(&self) -> &str {
        &self.pipeline.env().host_id
    }

    pub fn get_default_domain(&self) -> &str {
        &self.pipeline.env().default_domain
    }

    pub fn get_admin_mailbox(&self) -> &str {
        &self.pipeline.env().admin_mailbox
    }

    pub fn get_config_path(&self) -> &str {
        &self.pipeline.env().config_path
    }

    pub fn get_data_path(&self) -> &str {
        &self.pipeline.env().data_path
    }

    pub fn get_state_path(&self) -> &str {
        &self.pipeline.env().state_path
    }

    pub fn get_queue_path(&self) -> &str {
        &self.pipeline.env().queue_path
    }

    pub fn get_threads_num(&self) -> usize {
        self.pipeline.threads_max()
    }

    pub fn get_context_num(&self) -> usize {
        self.pipeline.context_num()
    }

    pub fn is_domainlist_valid(&self) -> bool {
        self.pipeline.env().domainlist_valid
    }

    /// Console-talk callback; one per plugin, replacing any earlier one.
    pub fn register_talk(&mut self, talk: TalkFn) -> bool {
        self.talk = Some(talk);
        true
    }
}

/// A plugin's console-command entry: takes the argument vector, returns
/// the text answer.
pub type TalkFn = Arc<dyn Fn(&[&str]) -> String + Send + Sync>;

pub(crate) struct PluginSlot {
    pub plugin: Arc<dyn HookPlugin>,
    pub talk: Option<TalkFn>,
    pub unloading: bool,
    /// Freed and finished; the slot stays so plugin indices held by hook
    /// entries remain stable.
    pub retired: bool,
}

impl Pipeline {
    /// Load a plugin: run its init under a registrar and keep it only
    /// when init succeeds.
    pub fn load_plugin(&self, plugin: Arc<dyn HookPlugin>) -> bool {
        let plugin_index = {
            let mut plugins = self.plugins().lock();
            plugins.push(PluginSlot {
                plugin: plugin.clone(),
                talk: None,
                unloading: false,
                retired: false,
            });
            plugins.len() - 1
        };
        let mut registrar = PluginRegistrar::new(self, plugin_index);
        if plugin.init(&mut registrar) {
            info!(plugin = plugin.name(), hooks = registrar.hooks.len(), "plugin loaded");
            self.plugins().lock()[plugin_index].talk = registrar.talk;
            return true;
        }
        warn!(plugin = plugin.name(), "plugin init failed, rolling back");
        for entry in registrar.hooks {
            entry.invalidate();
            self.registry().remove_entry(entry.id);
        }
        if registrar.registered_local {
            self.registry().clear_local();
        }
        self.plugins().lock()[plugin_index].unloading = true;
        false
    }

    /// Begin unloading: hooks are invalidated at once, the plugin is
    /// freed by the sweeper when the last in-flight call returns.
    pub fn unload_plugin(&self, name: &str) {
        let mut plugins = self.plugins().lock();
        for (index, slot) in plugins.iter_mut().enumerate() {
            if slot.plugin.name() == name && !slot.unloading {
                slot.unloading = true;
                drop_hooks(self, index);
            }
        }
    }

    /// Release unloading plugins whose hooks have fully drained.
    pub fn clean_up_unloading(&self) {
        self.registry().sweep();
        let snapshot = self.registry().snapshot();
        let mut plugins = self.plugins().lock();
        for (index, slot) in plugins.iter_mut().enumerate() {
            if !slot.unloading || slot.retired {
                continue;
            }
            let busy = snapshot
                .iter()
                .any(|entry| entry.plugin == Some(index) && entry.in_flight() != 0);
            if !busy {
                slot.plugin.free();
                slot.talk = None;
                slot.retired = true;
            }
        }
    }
}

fn drop_hooks(pipeline: &Pipeline, plugin_index: usize) {
    let owned = pipeline.registry().invalidate_plugin(plugin_index);
    info!(count = owned.len(), "plugin hooks invalidated for unload");
}
