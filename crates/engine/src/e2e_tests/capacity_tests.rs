//! spec.md §8 scenario 3: a connection past `MAX_CONNECTIONS` is rejected
//! rather than accepted and starved. The handshake-to-capacity-error wiring
//! itself lives in `api::ws::handle_socket`; this exercises the hub policy
//! it relies on, which is what the scenario is actually about.

use crate::infrastructure::hub::{ConnectionHub, RegisterError};

#[test]
fn fourth_connection_is_rejected_once_three_are_registered() {
    let hub = ConnectionHub::new(vec![], 3);

    assert!(hub.register("adv-1", "tok-1").is_ok());
    assert!(hub.register("adv-2", "tok-2").is_ok());
    assert!(hub.register("adv-3", "tok-3").is_ok());

    let rejected = hub.register("adv-4", "tok-4");
    assert_eq!(rejected.unwrap_err(), RegisterError::AtCapacity);
    assert_eq!(hub.len(), 3);
}

#[test]
fn freeing_a_slot_admits_the_next_connection() {
    let hub = ConnectionHub::new(vec![], 1);
    let reg = hub.register("adv-1", "tok-1").unwrap();
    assert_eq!(hub.register("adv-2", "tok-2").unwrap_err(), RegisterError::AtCapacity);

    hub.unregister(&reg.key);
    assert!(hub.register("adv-2", "tok-2").is_ok());
}
