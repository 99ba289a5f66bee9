use crate::adaptor::{Adaptor, AdaptorContext};

/// Adaptor with no hardware behind it
#[derive(Debug)]
pub struct LoopbackAdaptor {
    name: String,
}

impl LoopbackAdaptor {
    pub fn new(ctx: AdaptorContext) -> Self {
        Self { name: ctx.name }
    }
}

impl Adaptor for LoopbackAdaptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "loopback"
    }
}
