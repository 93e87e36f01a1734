use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Appointment, AppointmentStatus, Service, User};
use crate::domain::events::DomainEvent;
use crate::error::{EcommerceError, Result};
use crate::services::events::EventPublisher;
use crate::store::{AppointmentFilter, Store};

#[derive(Debug, Deserialize, Validate)]
pub struct BookingRequest {
    pub service_id: Uuid,
    pub esthetician_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub service_name: Option<String>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl BookingService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    #[instrument(skip(self, customer, request), fields(user_id = %customer.id, service_id = %request.service_id))]
    pub async fn book(&self, customer: &User, request: BookingRequest) -> Result<AppointmentView> {
        request.validate()?;
        if request.scheduled_at <= Utc::now() {
            return Err(EcommerceError::Validation("appointments must be booked in the future".into()));
        }
        let service = self
            .store
            .get_service(request.service_id)
            .await?
            .filter(Service::is_visible)
            .ok_or(EcommerceError::ServiceNotFound)?;
        match self.store.get_user(request.esthetician_id).await? {
            Some(staff) if staff.is_admin() && staff.active => {}
            _ => return Err(EcommerceError::Validation("unknown esthetician".into())),
        }

        let window_start = request.scheduled_at - Duration::days(1);
        let window_end = request.scheduled_at + Duration::days(1);
        let nearby = self
            .store
            .list_appointments(&AppointmentFilter {
                esthetician_id: Some(request.esthetician_id),
                from: Some(window_start),
                to: Some(window_end),
                ..AppointmentFilter::default()
            })
            .await?;
        if nearby.iter().any(|a| a.overlaps(request.scheduled_at, service.duration_minutes)) {
            return Err(EcommerceError::Conflict("the esthetician is already booked at that time".into()));
        }

        let appointment = Appointment::book(
            customer.id,
            request.esthetician_id,
            service.id,
            request.scheduled_at,
            service.duration_minutes,
            request.notes,
        );
        self.store.insert_appointment(&appointment).await?;
        info!(appointment_id = %appointment.id, at = %appointment.scheduled_at, "appointment booked");
        self.events
            .publish(DomainEvent::AppointmentBooked {
                appointment_id: appointment.id,
                service_id: service.id,
                esthetician_id: appointment.esthetician_id,
                scheduled_at: appointment.scheduled_at,
            })
            .await;
        Ok(view(appointment, Some(service.name)))
    }

    pub async fn mine(&self, customer: &User) -> Result<Vec<AppointmentView>> {
        let appointments = self
            .store
            .list_appointments(&AppointmentFilter { user_id: Some(customer.id), ..AppointmentFilter::default() })
            .await?;
        self.with_services(appointments).await
    }

    pub async fn cancel_for(&self, customer: &User, id: Uuid) -> Result<Appointment> {
        let mut appointment = self.get(id).await?;
        if appointment.user_id != customer.id {
            return Err(EcommerceError::AppointmentNotFound);
        }
        appointment.transition_to(AppointmentStatus::Cancelled)?;
        self.store.update_appointment(&appointment).await?;
        info!(appointment_id = %id, "appointment cancelled by customer");
        Ok(appointment)
    }

    /// All appointments, or those on `date` (UTC day).
    pub async fn admin_list(&self, date: Option<NaiveDate>) -> Result<Vec<AppointmentView>> {
        let (from, to) = match date.and_then(|d| d.and_hms_opt(0, 0, 0)) {
            Some(start) => {
                let start = start.and_utc();
                (Some(start), Some(start + Duration::days(1)))
            }
            None => (None, None),
        };
        let appointments =
            self.store.list_appointments(&AppointmentFilter { from, to, ..AppointmentFilter::default() }).await?;
        self.with_services(appointments).await
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment> {
        let mut appointment = self.get(id).await?;
        appointment.transition_to(status)?;
        self.store.update_appointment(&appointment).await?;
        info!(appointment_id = %id, status = %status, "appointment status updated");
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Appointment> {
        self.store.get_appointment(id).await?.ok_or(EcommerceError::AppointmentNotFound)
    }

    async fn with_services(&self, appointments: Vec<Appointment>) -> Result<Vec<AppointmentView>> {
        let services = self.store.list_services().await?;
        Ok(appointments
            .into_iter()
            .map(|a| {
                let name = services.iter().find(|s| s.id == a.service_id).map(|s| s.name.clone());
                view(a, name)
            })
            .collect())
    }
}

fn view(appointment: Appointment, service_name: Option<String>) -> AppointmentView {
    AppointmentView { ends_at: appointment.ends_at(), appointment, service_name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Role;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    struct Fixture {
        bookings: BookingService,
        events: EventPublisher,
        customer: User,
        staff: User,
        service: Service,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let customer = User::register("Paula", "paula@example.com", Role::Customer);
        let staff = User::register("Dra. Camila", "camila@example.com", Role::Admin);
        store.insert_user(&customer).await.unwrap();
        store.insert_user(&staff).await.unwrap();
        let service = Service::create("Peeling", "peeling", Decimal::new(250, 0), 60);
        store.insert_service(&service).await.unwrap();
        let events = EventPublisher::recording();
        Fixture { bookings: BookingService::new(store, events.clone()), events, customer, staff, service }
    }

    fn request(f: &Fixture, at: DateTime<Utc>) -> BookingRequest {
        BookingRequest { service_id: f.service.id, esthetician_id: f.staff.id, scheduled_at: at, notes: None }
    }

    fn tomorrow_at(hour: u32) -> DateTime<Utc> {
        let day = (Utc::now() + Duration::days(1)).date_naive();
        day.and_hms_opt(hour, 0, 0).unwrap().and_utc()
    }

    #[tokio::test]
    async fn test_book_and_reject_overlap() {
        let f = fixture().await;
        let booked = f.bookings.book(&f.customer, request(&f, tomorrow_at(10))).await.unwrap();
        assert_eq!(booked.ends_at, tomorrow_at(11));
        assert_eq!(booked.service_name.as_deref(), Some("Peeling"));
        assert!(matches!(f.events.recorded()[0], DomainEvent::AppointmentBooked { .. }));

        let clash = tomorrow_at(10) + Duration::minutes(30);
        let err = f.bookings.book(&f.customer, request(&f, clash)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));

        f.bookings.book(&f.customer, request(&f, tomorrow_at(11))).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let f = fixture().await;
        let booked = f.bookings.book(&f.customer, request(&f, tomorrow_at(14))).await.unwrap();
        f.bookings.cancel_for(&f.customer, booked.appointment.id).await.unwrap();
        f.bookings.book(&f.customer, request(&f, tomorrow_at(14))).await.unwrap();
        assert_eq!(f.bookings.admin_list(Some(tomorrow_at(0).date_naive())).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_booking_rules() {
        let f = fixture().await;
        let past = Utc::now() - Duration::hours(1);
        assert!(matches!(f.bookings.book(&f.customer, request(&f, past)).await, Err(EcommerceError::Validation(_))));

        let mut by_customer = request(&f, tomorrow_at(9));
        by_customer.esthetician_id = f.customer.id;
        assert!(matches!(f.bookings.book(&f.customer, by_customer).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_status_flow() {
        let f = fixture().await;
        let booked = f.bookings.book(&f.customer, request(&f, tomorrow_at(16))).await.unwrap();
        let id = booked.appointment.id;
        f.bookings.set_status(id, AppointmentStatus::Confirmed).await.unwrap();
        f.bookings.set_status(id, AppointmentStatus::Completed).await.unwrap();
        assert!(f.bookings.set_status(id, AppointmentStatus::Cancelled).await.is_err());
        assert!(f.bookings.cancel_for(&f.customer, id).await.is_err());
    }
}
