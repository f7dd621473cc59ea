use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Yes/no dialog shown by the shell.
#[derive(Clone)]
pub struct Prompt<Ev> {
    context: CapabilityContext<ConfirmRequest, Ev>,
}

impl<Ev> Capability<Ev> for Prompt<Ev> {
    type Operation = ConfirmRequest;
    type MappedSelf<MappedEv> = Prompt<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Prompt::new(self.context.map_event(f))
    }
}

impl<Ev> Prompt<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ConfirmRequest, Ev>) -> Self {
        Self { context }
    }

    /// The callback gets `false` for both "no" and dismissing the dialog.
    pub fn confirm<F>(&self, request: ConfirmRequest, callback: F)
    where
        F: FnOnce(bool) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let confirmed = ctx.request_from_shell(request).await;
            ctx.update_app(callback(confirmed));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub cancel_label: String,
    pub destructive: bool,
}

impl Operation for ConfirmRequest {
    type Output = bool;
}

impl ConfirmRequest {
    pub fn clear_history() -> Self {
        Self {
            title: "Clear History".into(),
            message: "Are you sure you want to delete all diagnosis history?".into(),
            confirm_label: "Clear".into(),
            cancel_label: "Cancel".into(),
            destructive: true,
        }
    }
}
