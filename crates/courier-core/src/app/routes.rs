//! Route definitions - ビルダーに渡すルート宣言
//!
//! ```ignore
//! let hello = CallableDef::new("Say Hello", SchemaProvider::value(schema), Invoker::Direct(handler))
//!     .with_options(RouteOptions { region: Some("us-east1".into()), ..Default::default() });
//! ```

use super::callable::{CallableSchema, ScopeFn};
use crate::ports::RouteOptions;
use crate::typed::{CallableHandler, CustomTrigger, EventHandler, Invoker, SchemaProvider, SchemaRef};
use std::sync::Arc;

pub struct CallableDef {
    pub name: String,
    /// 省略時は名前から作る
    pub key: Option<String>,
    pub schema: SchemaProvider<CallableSchema>,
    pub invoker: Invoker<dyn CallableHandler>,
    pub scope: Option<ScopeFn>,
    pub options: RouteOptions,
}

impl CallableDef {
    pub fn new(
        name: impl Into<String>,
        schema: SchemaProvider<CallableSchema>,
        invoker: Invoker<dyn CallableHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            key: None,
            schema,
            invoker,
            scope: None,
            options: RouteOptions::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_scope(mut self, scope: ScopeFn) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }
}

/// PubSub / Bus 共通のルート宣言
pub struct EventDef {
    /// topic または event type
    pub trigger: String,
    /// 省略時は種類ごとのカウンタから作る
    pub key: Option<String>,
    pub schema: SchemaProvider<SchemaRef>,
    pub invoker: Invoker<dyn EventHandler>,
    pub throw_error: bool,
    pub options: RouteOptions,
}

impl EventDef {
    pub fn new(
        trigger: impl Into<String>,
        schema: SchemaProvider<SchemaRef>,
        invoker: Invoker<dyn EventHandler>,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            key: None,
            schema,
            invoker,
            throw_error: false,
            options: RouteOptions::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn throw_error(mut self, throw_error: bool) -> Self {
        self.throw_error = throw_error;
        self
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }
}

pub struct CustomDef {
    pub name: String,
    pub key: Option<String>,
    pub trigger: Arc<dyn CustomTrigger>,
    pub throw_error: bool,
    pub options: RouteOptions,
}

impl CustomDef {
    pub fn new(name: impl Into<String>, trigger: Arc<dyn CustomTrigger>) -> Self {
        Self {
            name: name.into(),
            key: None,
            trigger,
            throw_error: false,
            options: RouteOptions::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn throw_error(mut self, throw_error: bool) -> Self {
        self.throw_error = throw_error;
        self
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }
}
