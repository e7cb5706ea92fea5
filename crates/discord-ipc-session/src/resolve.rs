use discord_ipc_transport::Endpoint;

/// Finds the endpoint a session should connect to.
///
/// Discovery (scanning runtime directories, probing candidate sockets) lives
/// outside this crate. `pipe` is the optional discriminator from
/// [`SessionConfig::pipe`](crate::SessionConfig::pipe).
pub trait ResolveEndpoint {
    fn resolve(&self, pipe: Option<u32>) -> Option<Endpoint>;
}

/// A fixed endpoint resolves to itself whatever the discriminator.
impl ResolveEndpoint for Endpoint {
    fn resolve(&self, _pipe: Option<u32>) -> Option<Endpoint> {
        Some(self.clone())
    }
}

impl<T: ResolveEndpoint + ?Sized> ResolveEndpoint for &T {
    fn resolve(&self, pipe: Option<u32>) -> Option<Endpoint> {
        (**self).resolve(pipe)
    }
}

/// Adapts a closure into a resolver.
pub struct ResolveFn<F>(pub F);

impl<F> ResolveEndpoint for ResolveFn<F>
where
    F: Fn(Option<u32>) -> Option<Endpoint>,
{
    fn resolve(&self, pipe: Option<u32>) -> Option<Endpoint> {
        (self.0)(pipe)
    }
}
