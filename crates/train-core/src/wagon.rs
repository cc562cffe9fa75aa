//! Wagons: named per-consumer handles onto a shared train.

use crate::train::Train;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::hash::{BuildHasher, RandomState};
use std::ops::Deref;
use std::rc::Rc;
use tracing::debug;
use train_proto::{Error, Result};

/// Identity of a wagon attached to a train.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagonRecord {
    pub name: String,
    pub id: String,
}

/// A micro app's handle onto the train. Dereferences to the train, so every
/// bus operation is available on it.
#[derive(Debug, Clone)]
pub struct Wagon {
    record: WagonRecord,
    train: Rc<Train>,
}

impl Wagon {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn train(&self) -> &Rc<Train> {
        &self.train
    }
}

impl Deref for Wagon {
    type Target = Train;

    fn deref(&self) -> &Train {
        &self.train
    }
}

impl Train {
    /// Creates, or re-attaches to, the wagon for `micro_app_name`.
    ///
    /// The same name always yields the same wagon id.
    pub fn create_wagon(self: &Rc<Self>, micro_app_name: &str) -> Result<Wagon> {
        if micro_app_name.trim().is_empty() {
            return Err(Error::InitFault);
        }

        let existing = self
            .wagons
            .borrow()
            .iter()
            .find(|record| record.name == micro_app_name)
            .cloned();

        let record = match existing {
            Some(record) => {
                debug!(wagon = %record.name, "Re-attached to existing wagon");
                record
            }
            None => {
                let mut wagons = self.wagons.borrow_mut();
                let record = WagonRecord {
                    name: micro_app_name.to_string(),
                    id: wagon_id(micro_app_name, wagons.len()),
                };
                wagons.push(record.clone());
                debug!(wagon = %record.name, id = %record.id, "Wagon created");
                record
            }
        };

        Ok(Wagon {
            record,
            train: Rc::clone(self),
        })
    }

    /// Wagons created on this train, in creation order.
    pub fn wagons(&self) -> Vec<WagonRecord> {
        self.wagons.borrow().clone()
    }
}

fn wagon_id(name: &str, position: usize) -> String {
    let digest = RandomState::new().hash_one((name, position));
    URL_SAFE_NO_PAD.encode(digest.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainConfig;
    use crate::testing::Page;
    use serde_json::json;
    use std::cell::RefCell;
    use train_proto::EventEnvelope;

    fn train() -> (Page, Rc<Train>) {
        let page = Page::new("https://portal.example");
        let config = TrainConfig {
            public_events: vec!["shop/cart/item/add".to_string()],
            ..TrainConfig::default()
        };
        let train = Train::bootstrap(page.top(), &config).unwrap();
        (page, train)
    }

    #[test]
    fn test_empty_name_is_init_fault() {
        let (_page, train) = train();
        assert!(matches!(train.create_wagon(""), Err(Error::InitFault)));
        assert!(matches!(train.create_wagon("   "), Err(Error::InitFault)));
    }

    #[test]
    fn test_same_name_same_wagon() {
        let (_page, train) = train();
        let first = train.create_wagon("cart").unwrap();
        let again = train.create_wagon("cart").unwrap();
        let other = train.create_wagon("checkout").unwrap();

        assert_eq!(first.id(), again.id());
        assert_ne!(first.id(), other.id());
        assert_eq!(train.wagons().len(), 2);
    }

    #[test]
    fn test_wagons_share_one_bus() {
        let (_page, train) = train();
        let cart = train.create_wagon("cart").unwrap();
        let checkout = train.create_wagon("checkout").unwrap();

        let seen = Rc::new(RefCell::new(0));
        let seen_clone = Rc::clone(&seen);
        checkout
            .subscribe(
                "shop/cart/item/add",
                Rc::new(move |_: &EventEnvelope| {
                    *seen_clone.borrow_mut() += 1;
                    Ok(())
                }),
            )
            .unwrap();
        cart.publish("shop/cart/item/add", json!({"sku": "A"})).unwrap();

        assert_eq!(*seen.borrow(), 1);
        assert!(Rc::ptr_eq(cart.train(), checkout.train()));
    }
}
