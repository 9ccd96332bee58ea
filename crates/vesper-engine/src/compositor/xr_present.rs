use crate::present::VrSubmitter;
use crate::window::ContextId;

/// XR presentation state owned by the frame context.
#[derive(Default)]
pub struct XrPresentation {
    /// The context rendered as the eye buffer, while presenting.
    pub context: Option<ContextId>,
    /// A fresh pose was applied this tick. Consumed by submission.
    pub has_pose: bool,
    /// Mirror only the left half of the side-by-side eye buffer.
    pub mirror: bool,
    pub(crate) submitter: Option<Box<dyn VrSubmitter>>,
}

impl XrPresentation {
    pub fn new(mirror: bool) -> Self {
        Self {
            mirror,
            ..Self::default()
        }
    }

    pub fn is_presenting(&self) -> bool {
        self.context.is_some()
    }

    pub fn set_submitter(&mut self, submitter: Box<dyn VrSubmitter>) {
        self.submitter = Some(submitter);
    }
}
