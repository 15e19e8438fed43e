pub mod identity;
pub mod clients;
pub mod resiliency;

pub use identity::{Caller, Role};
pub use clients::{
    Address, AddressClient, Basket, BasketClient, Collaborators, DeleteBasketsRequest,
    InventoryClient, RemoteError, RemoteResult, User, UserClient,
};
pub use resiliency::{CircuitBreaker, CircuitState};
